use lamina_engine::{Session, SessionConfig};
use pretty_assertions::assert_eq;

use super::{RunOptions, Summary, run_script};

fn run(text: &str, options: RunOptions) -> (Summary, String) {
	run_with(SessionConfig::default(), text, options)
}

fn run_with(config: SessionConfig, text: &str, options: RunOptions) -> (Summary, String) {
	let session = Session::open(config).unwrap();
	let mut out = Vec::new();
	let summary = run_script(&session, text, options, &mut out).unwrap();
	(summary, String::from_utf8(out).unwrap())
}

#[test]
fn runs_commands_and_undo_lines_in_order() {
	let script = "\
# build a layer
create_layer base 2 2 fill=1.0
rename_layer base top
undo
redo
layer_info top
";
	let (summary, out) = run(script, RunOptions::default());
	assert_eq!(summary, Summary { succeeded: 5, failed: 0 });
	assert_eq!(
		out,
		"\
2: create_layer -> #1
3: rename_layer -> #1
4: undo
5: redo -> #1
6: layer_info -> #1 top 2x2 mean=1.000
"
	);
}

#[test]
fn stops_at_the_first_failure() {
	let script = "create_layer a 1 1\nrename_layer missing b\ncreate_layer c 1 1\n";
	let (summary, out) = run(script, RunOptions::default());
	assert_eq!(summary, Summary { succeeded: 1, failed: 1 });
	assert_eq!(out, "1: create_layer -> #1\n2: invalid: unknown layer 'missing'\n");
}

#[test]
fn keep_going_reports_every_failure() {
	let script = "paint a\nundo\ncreate_layer c 1 1\n";
	let options = RunOptions {
		keep_going: true,
		..RunOptions::default()
	};
	let (summary, out) = run(script, options);
	assert_eq!(summary, Summary { succeeded: 1, failed: 2 });
	assert_eq!(
		out,
		"1: error: unknown action 'paint'\n2: invalid: undo list is empty\n3: create_layer -> #1\n"
	);
}

#[test]
fn warnings_are_reported_on_the_line_that_caused_them() {
	let mut config = SessionConfig::default();
	config.undo.max_items = 1;
	let script = "create_layer a 1 1\ncreate_layer b 1 1\ncreate_layer c 1 1\n";
	let (summary, out) = run_with(config, script, RunOptions::default());
	assert_eq!(summary, Summary { succeeded: 3, failed: 0 });
	assert_eq!(
		out,
		"\
1: create_layer -> #1
2: create_layer -> #2
2: warning: undo step 'create_layer a 1 1' dropped to stay within the undo budget
3: create_layer -> #3
3: warning: undo step 'create_layer b 1 1' dropped to stay within the undo budget
"
	);
}

#[test]
fn syntax_errors_reject_the_whole_script() {
	let session = Session::open(SessionConfig::default()).unwrap();
	let mut out = Vec::new();
	let err = run_script(&session, "create_layer a 1 1\nrename_layer \"open", RunOptions::default(), &mut out).unwrap_err();
	assert!(err.to_string().starts_with("line 2: unterminated"));
	assert!(out.is_empty());
}
