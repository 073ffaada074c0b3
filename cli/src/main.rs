mod config;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use engine::{Context, Engine, FileLoader, Settings};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "stencil", version, about = "Directive-based template renderer")]
struct Cli {
    /// Template file to render
    file: String,

    /// TOML file with [settings] and [variables]
    #[arg(short, long)]
    config: Option<String>,

    /// Parse only, don't render (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump parsed AST
    #[arg(long)]
    ast: bool,

    /// Disable colored error output
    #[arg(long)]
    no_color: bool,

    /// Render into a sink (just check for errors)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    // Read source
    let source = match std::fs::read_to_string(&cli.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", cli.file, e);
            process::exit(1);
        }
    };

    // Set up codespan file database
    let mut files = SimpleFiles::new();
    let file_id = files.add(cli.file.clone(), source.clone());

    // Parse
    let parser = stencil::parser::Parser::new(source.clone(), file_id);
    let template = match parser.parse() {
        Ok(t) => t,
        Err(errors) => {
            let writer = StandardStream::stderr(color_choice);
            let term_config = term::Config::default();
            for error in &errors {
                let diagnostic = error.to_diagnostic();
                let _ = term::emit_to_write_style(
                    &mut writer.lock(),
                    &term_config,
                    &files,
                    &diagnostic,
                );
            }
            process::exit(1);
        }
    };

    // --check: parse succeeded, exit
    if cli.check {
        eprintln!("ok: {} parsed successfully", cli.file);
        return;
    }

    // --ast: dump AST
    if cli.ast {
        println!("{:#?}", template);
        return;
    }

    // Engine settings and initial variables
    let config = match &cli.config {
        Some(path) => match Config::load(Path::new(path)) {
            Ok(config) => config,
            Err(message) => {
                eprintln!("error: {}", message);
                process::exit(1);
            }
        },
        None => Config::default(),
    };
    let variables = match config.variables() {
        Ok(variables) => variables,
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(1);
        }
    };

    // Relative imports resolve against the template's own directory
    let file_path = Path::new(&cli.file);
    let base_dir = file_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let logical_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.file.clone());

    let engine = Engine::new(FileLoader::new(base_dir), config.settings());
    let mut context = Context::new();
    for (name, value) in variables {
        context.set(&name, value);
    }

    let result = if cli.quiet {
        let mut sink = std::io::sink();
        engine.render_str(&source, &logical_name, &mut context, &mut sink)
    } else {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let result = engine.render_str(&source, &logical_name, &mut context, &mut handle);
        let _ = handle.flush();
        result
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("warning: render completed with reported failures");
            process::exit(2);
        }
        Err(error) => {
            eprintln!("render error: {}", error);
            process::exit(1);
        }
    }
}
