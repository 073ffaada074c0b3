use std::fs;
use std::path::Path;

use engine::{Context, Engine, FileLoader, RenderError, Settings};

fn try_eval_at(
    dir: &Path,
    source: &str,
    settings: Settings,
    context: &mut Context,
) -> (Result<bool, RenderError>, String) {
    let engine = Engine::new(FileLoader::new(dir), settings);
    let mut output = Vec::new();
    let result = engine.render_str(source, "main.vm", context, &mut output);
    (result, String::from_utf8(output).expect("output is not UTF-8"))
}

fn eval(source: &str) -> String {
    let mut context = Context::new();
    eval_ctx(source, &mut context)
}

fn eval_ctx(source: &str, context: &mut Context) -> String {
    let (result, output) = try_eval_at(Path::new("."), source, Settings::default(), context);
    assert!(result.expect("render failed"), "render reported failures");
    output
}

fn eval_at(dir: &Path, source: &str) -> String {
    eval_at_with(dir, source, Settings::default())
}

fn eval_at_with(dir: &Path, source: &str, settings: Settings) -> String {
    let mut context = Context::new();
    let (result, output) = try_eval_at(dir, source, settings, &mut context);
    assert!(result.expect("render failed"), "render reported failures");
    output
}

// ---------------------------------------------------------------------------
// Text, references, #set
// ---------------------------------------------------------------------------

#[test]
fn plain_text_passes_through() {
    assert_eq!(eval("just some text"), "just some text");
}

#[test]
fn set_and_reference() {
    assert_eq!(eval("#set($name = 'World')Hello, $name!"), "Hello, World!");
}

#[test]
fn set_overwrites_previous_value() {
    assert_eq!(eval("#set($x = 'a')#set($x = 'b')$x"), "b");
}

#[test]
fn set_from_reference() {
    assert_eq!(eval("#set($a = 'x')#set($b = $a)$b"), "x");
}

#[test]
fn unbound_reference_echoes_itself() {
    assert_eq!(eval("Hello, $name!"), "Hello, $name!");
}

#[test]
fn unbound_quiet_reference_renders_empty() {
    assert_eq!(eval("Hello, $!name!"), "Hello, !");
}

#[test]
fn bound_quiet_reference_renders_value() {
    assert_eq!(eval("#set($name = 'World')Hello, $!name!"), "Hello, World!");
}

#[test]
fn braced_reference() {
    assert_eq!(eval("#set($n = 'x')${n}y"), "xy");
}

#[test]
fn number_values_render_like_the_literal() {
    assert_eq!(eval("#set($n = 42)$n"), "42");
    assert_eq!(eval("#set($f = 2.5)$f"), "2.5");
}

#[test]
fn boolean_values_render_as_words() {
    assert_eq!(eval("#set($b = true)$b"), "true");
}

// ---------------------------------------------------------------------------
// #defvar / #defconst / #unset
// ---------------------------------------------------------------------------

#[test]
fn defvar_defines_when_undefined() {
    assert_eq!(
        eval("#defvar($var, 'value')$var#defvar($var, 'again') is $var"),
        "value is value"
    );
}

#[test]
fn defvar_after_set_is_a_noop() {
    assert_eq!(
        eval("#set($var = 'value')$var#defvar($var, 'again') is $var"),
        "value is value"
    );
}

#[test]
fn defvar_then_set_changes_the_value() {
    assert_eq!(
        eval("#defvar($var, 'value')$var#set($var = 'changed') is $var"),
        "value is changed"
    );
}

#[test]
fn defconst_survives_set() {
    assert_eq!(
        eval("#defconst($var,'immutable')$var#set($var = ' x') is $var"),
        "immutable is immutable"
    );
}

#[test]
fn defconst_survives_unset() {
    assert_eq!(
        eval("#defconst($var,'immutable')$var#unset($var) is $var"),
        "immutable is immutable"
    );
}

#[test]
fn defconst_redefinition_is_a_quiet_noop() {
    assert_eq!(eval("#defconst($c, 'one')#defconst($c, 'two')$c"), "one");
}

#[test]
fn unset_removes_the_binding() {
    assert_eq!(
        eval("#set($val = 'value')$val#unset($val) is $val"),
        "value is $val"
    );
}

#[test]
fn shallow_unset_reveals_the_outer_binding() {
    let mut context = Context::new();
    context.set("val", engine::Value::String("outer".to_string()));
    context.push_scope();
    assert_eq!(
        eval_ctx("#set($val = 'value')$val#unset($val) is $val", &mut context),
        "value is outer"
    );
    context.pop_scope();
    assert_eq!(
        context.get("val"),
        Some(&engine::Value::String("outer".to_string()))
    );
}

#[test]
fn deep_unset_clears_the_whole_chain() {
    let mut context = Context::new();
    context.set("val", engine::Value::String("outer".to_string()));
    context.push_scope();
    assert_eq!(
        eval_ctx(
            "#set($val = 'value')$val#unset($val, true) is $val",
            &mut context
        ),
        "value is $val"
    );
}

// ---------------------------------------------------------------------------
// #nil / #nop / #stop
// ---------------------------------------------------------------------------

#[test]
fn nil_discards_output_but_keeps_side_effects() {
    assert_eq!(
        eval("#set($var = 'initial')#nil()hidden#set($var = 'value')#end$var"),
        "value"
    );
}

#[test]
fn nil_ignores_its_arguments() {
    assert_eq!(eval("#nil('arguments', 'are', 'ignored', $NULL)#nop()#end"), "");
}

#[test]
fn nop_renders_nothing() {
    assert_eq!(eval("#nop()"), "");
    assert_eq!(eval("#nop('arguments', 'are', 'ignored', $NULL)"), "");
}

#[test]
fn stop_suppresses_the_rest_of_the_render() {
    assert_eq!(eval("before#stop()after"), "before");
    assert_eq!(eval("before#stop after"), "before");
}

#[test]
fn stop_inside_an_import_suppresses_the_outer_template_too() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("imported.vm"), "in#stop()side").expect("write failed");
    assert_eq!(eval_at(dir.path(), "a#import('imported.vm')b"), "ain");
}

// ---------------------------------------------------------------------------
// #block outside #apply
// ---------------------------------------------------------------------------

#[test]
fn block_without_apply_renders_its_own_body() {
    assert_eq!(eval("#block('b1')content#end"), "content");
}

#[test]
fn block_with_null_name_fails_softly() {
    let mut context = Context::new();
    let (result, output) = try_eval_at(
        Path::new("."),
        "#block($NULL)content#end",
        Settings::default(),
        &mut context,
    );
    assert!(!result.expect("render failed"));
    assert_eq!(output, "");
}

// ---------------------------------------------------------------------------
// #apply / #block override resolution
// ---------------------------------------------------------------------------

#[test]
fn apply_replaces_overridden_blocks_only() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join("base.vm"),
        "The block below is replaced:\n#block('block1')original block1#end\n#block('block2')original block2#end",
    )
    .expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base.vm')#block('block1')replacement#end#block('undefined')not shown#end plain text not shown#end",
    );
    assert_eq!(
        output,
        "The block below is replaced:\nreplacement\noriginal block2"
    );
}

#[test]
fn first_override_wins_within_one_apply() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b1')base#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base.vm')#block('b1')first#end#block('b1')second#end#end",
    );
    assert_eq!(output, "first");
}

#[test]
fn apply_without_overrides_degenerates_to_import() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b1')base#end").expect("write failed");

    assert_eq!(eval_at(dir.path(), "#apply('base.vm')#end"), "base");
}

#[test]
fn block_name_may_be_a_reference() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b1')base#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#set($n = 'b1')#apply('base.vm')#block($n)via reference#end#end",
    );
    assert_eq!(output, "via reference");
}

#[test]
fn early_binding_uses_the_override_scope() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join("base.vm"),
        "#set($var1 = 'base')#block('b1')var1 = $var1#end",
    )
    .expect("write failed");

    let output = eval_at(
        dir.path(),
        "#set($var1 = 'extended')#apply('base.vm')#block('b1')var1 = $var1#end#end",
    );
    assert_eq!(output, "var1 = extended");
}

#[test]
fn late_binding_uses_the_base_template_scope() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join("base.vm"),
        "#set($var1 = 'base')#block('b1')var1 = $var1#end",
    )
    .expect("write failed");

    let settings = Settings {
        late_rendering: true,
        ..Settings::default()
    };
    let output = eval_at_with(
        dir.path(),
        "#set($var1 = 'extended')#apply('base.vm')#block('b1')var1 = $var1#end#end",
        settings,
    );
    assert_eq!(output, "var1 = base");
}

#[test]
fn unoverridden_blocks_bind_against_the_base_scope_either_way() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join("base.vm"),
        "#set($var1 = 'base')#block('b0')var1 = $var1#end",
    )
    .expect("write failed");

    for late_rendering in [false, true] {
        let settings = Settings {
            late_rendering,
            ..Settings::default()
        };
        let output = eval_at_with(dir.path(), "#apply('base.vm')#end", settings);
        assert_eq!(output, "var1 = base");
    }
}

#[test]
fn capture_failure_aborts_the_whole_apply() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b1')base#end").expect("write failed");

    let mut context = Context::new();
    let (result, output) = try_eval_at(
        dir.path(),
        "#apply('base.vm')#block('b1')#import('missing.vm')#end#end",
        Settings::default(),
        &mut context,
    );
    assert!(matches!(
        result,
        Err(RenderError::ResourceNotFound(name)) if name == "missing.vm"
    ));
    assert_eq!(output, "");
}

// ---------------------------------------------------------------------------
// #prepend / #append
// ---------------------------------------------------------------------------

#[test]
fn prepends_and_appends_wrap_the_base_body_in_encounter_order() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b')[base]#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base.vm')#prepend('b')p1 #end#prepend('b')p2 #end#append('b') a1#end#append('b') a2#end#end",
    );
    assert_eq!(output, "p1 p2 [base] a1 a2");
}

#[test]
fn prepend_composes_with_an_override() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base.vm"), "#block('b')[base]#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base.vm')#prepend('b')p #end#block('b')override#end#end",
    );
    assert_eq!(output, "p override");
}

#[test]
fn prepend_outside_apply_is_rejected() {
    let mut context = Context::new();
    let (result, output) = try_eval_at(
        Path::new("."),
        "x#prepend('b')nope#end y",
        Settings::default(),
        &mut context,
    );
    assert!(!result.expect("render failed"));
    assert_eq!(output, "x y");
}

#[test]
fn append_outside_apply_is_rejected() {
    let mut context = Context::new();
    let (result, output) = try_eval_at(
        Path::new("."),
        "x#append('b')nope#end y",
        Settings::default(),
        &mut context,
    );
    assert!(!result.expect("render failed"));
    assert_eq!(output, "x y");
}

// ---------------------------------------------------------------------------
// Nested applies
// ---------------------------------------------------------------------------

#[test]
fn sibling_applies_do_not_share_chains() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base1.vm"), "#block('x')base1-x#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base1.vm')#block('x')one#end#end|#apply('base1.vm')#end",
    );
    assert_eq!(output, "one|base1-x");
}

#[test]
fn nested_applies_keep_their_own_registries() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("base1.vm"), "#block('x')base1-x#end").expect("write failed");
    fs::write(dir.path().join("base2.vm"), "#block('x')base2-x#end").expect("write failed");

    let output = eval_at(
        dir.path(),
        "#apply('base1.vm')#block('x')#apply('base2.vm')#block('x')inner#end#end+outer#end#end",
    );
    assert_eq!(output, "inner+outer");
}

// ---------------------------------------------------------------------------
// #import
// ---------------------------------------------------------------------------

#[test]
fn import_renders_the_target_inline() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("test.vm"), "Here is 'test.vm'.\n").expect("write failed");

    let output = eval_at(
        dir.path(),
        "Before importing.\n#import('test.vm')After importing.\n",
    );
    assert_eq!(output, "Before importing.\nHere is 'test.vm'.\nAfter importing.\n");
}

#[test]
fn relative_imports_resolve_against_the_importing_template() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::create_dir_all(dir.path().join("sub")).expect("mkdir failed");
    fs::write(dir.path().join("sub/inner.vm"), "inner:#import('leaf.vm')").expect("write failed");
    fs::write(dir.path().join("sub/leaf.vm"), "leaf").expect("write failed");

    assert_eq!(eval_at(dir.path(), "#import('sub/inner.vm')"), "inner:leaf");
}

#[test]
fn absolute_imports_resolve_against_the_loader_root() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::create_dir_all(dir.path().join("sub")).expect("mkdir failed");
    fs::write(dir.path().join("sub/abs.vm"), "#import('/top.vm')").expect("write failed");
    fs::write(dir.path().join("top.vm"), "top").expect("write failed");

    assert_eq!(eval_at(dir.path(), "#import('sub/abs.vm')"), "top");
}

#[test]
fn importing_a_missing_template_is_a_hard_error() {
    let mut context = Context::new();
    let (result, _) = try_eval_at(
        Path::new("."),
        "#import('missing.vm')",
        Settings::default(),
        &mut context,
    );
    assert!(matches!(
        result,
        Err(RenderError::ResourceNotFound(name)) if name == "missing.vm"
    ));
}

#[test]
fn import_with_null_argument_fails_softly() {
    let mut context = Context::new();
    let (result, output) = try_eval_at(
        Path::new("."),
        "a#import($NULL)b",
        Settings::default(),
        &mut context,
    );
    assert!(!result.expect("render failed"));
    assert_eq!(output, "ab");
}

#[test]
fn self_import_stops_at_the_depth_limit() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("loop.vm"), "x#import('loop.vm')").expect("write failed");

    let settings = Settings {
        max_depth: 5,
        ..Settings::default()
    };
    let engine = Engine::new(FileLoader::new(dir.path()), settings);
    let mut context = Context::new();
    let mut output = Vec::new();
    let result = engine.render("loop.vm", &mut context, &mut output);

    assert!(!result.expect("render failed"), "expected a depth-limit report");
    assert_eq!(String::from_utf8(output).expect("output is not UTF-8"), "xxxxx");
}

#[test]
fn override_bodies_may_import_shared_overrides() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join("base.vm"),
        "#block('block1')b1#end-#block('block2')b2#end",
    )
    .expect("write failed");
    fs::write(
        dir.path().join("overrides.vm"),
        "#block('block1')from-file#end",
    )
    .expect("write failed");

    let output = eval_at(dir.path(), "#apply('base.vm')#import('overrides.vm')#end");
    assert_eq!(output, "from-file-b2");
}

// ---------------------------------------------------------------------------
// #displace
// ---------------------------------------------------------------------------

#[test]
fn displace_renders_an_existing_target_and_drops_the_fallback() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("target.vm"), "Here is the target.\n").expect("write failed");

    let output = eval_at(dir.path(), "#displace('target.vm')not displaced#end");
    assert_eq!(output, "Here is the target.\n");
}

#[test]
fn displace_falls_back_when_the_target_is_missing() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = eval_at(dir.path(), "#displace('missing.vm')not displaced#end");
    assert_eq!(output, "not displaced");
}

#[test]
fn displace_with_a_null_target_falls_back() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = eval_at(dir.path(), "#displace($NULL)not displaced#end");
    assert_eq!(output, "not displaced");
}

// ---------------------------------------------------------------------------
// Parse failures through the engine API
// ---------------------------------------------------------------------------

#[test]
fn render_str_reports_parse_errors() {
    let mut context = Context::new();
    let engine = Engine::new(FileLoader::new("."), Settings::default());
    let mut output = Vec::new();
    let result = engine.render_str("#block('a')no end", "main.vm", &mut context, &mut output);
    assert!(matches!(
        result,
        Err(RenderError::Parse { template, .. }) if template == "main.vm"
    ));
}

#[test]
fn imported_templates_with_parse_errors_are_hard_errors() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("broken.vm"), "#block()#end").expect("write failed");

    let mut context = Context::new();
    let (result, _) = try_eval_at(
        dir.path(),
        "#import('broken.vm')",
        Settings::default(),
        &mut context,
    );
    assert!(matches!(result, Err(RenderError::Parse { .. })));
}
