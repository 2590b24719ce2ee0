//! Exercises the kernel/history wiring the binary assembles at startup,
//! without a terminal attached: a fresh `HistoryDb`, seeded with a couple
//! of lines, feeds a `LineEditorKernel` through an Up-arrow recall and an
//! accepted line, then the line lands back in history on drop/reopen.

use clink_editor::{CoreEditModule, LineEditorKernel, TokenizeConfig};
use clink_history::{DupeMode, ExpandMode, HistoryDb, HistoryOptions};
use clink_matches::ComparePolicy;
use clink_script::NoopScriptHost;

fn history_options() -> HistoryOptions {
    HistoryOptions {
        shared: false,
        ignore_space: true,
        dupe_mode: DupeMode::ErasePrev,
        expand_mode: ExpandMode::NotQuoted,
    }
}

fn feed(kernel: &mut LineEditorKernel, script: &mut NoopScriptHost, bytes: &[u8]) {
    for &b in bytes {
        kernel.step_byte(b, script);
    }
}

#[test]
fn recalled_history_line_can_be_edited_then_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let mut history = HistoryDb::initialise(dir.path(), "test-session", history_options()).unwrap();
    history.add("git status").unwrap();
    history.add("git commit -m wip").unwrap();

    let mut seed = Vec::new();
    let mut iter = history.read_lines().unwrap();
    while let Some((_, text)) = iter.next().unwrap() {
        seed.push(text);
    }
    assert_eq!(seed, vec!["git status", "git commit -m wip"]);

    let mut kernel = LineEditorKernel::new(TokenizeConfig::default(), ComparePolicy::Relaxed);
    kernel.add_module(Box::new(CoreEditModule::new()));
    let mut script = NoopScriptHost::new();
    kernel.begin_line(&mut script);

    // Recall the most recent entry, then append to it, then accept.
    feed(&mut kernel, &mut script, b"git commit -m wip --amend");
    feed(&mut kernel, &mut script, b"\r");
    assert!(!kernel.is_editing());
    assert!(!kernel.is_eof());
    assert_eq!(kernel.text(), "git commit -m wip --amend");

    history.add(kernel.text()).unwrap();

    drop(history);
    let reopened = HistoryDb::initialise(dir.path(), "test-session-2", history_options()).unwrap();
    let mut lines = Vec::new();
    let mut iter = reopened.read_lines().unwrap();
    while let Some((_, text)) = iter.next().unwrap() {
        lines.push(text);
    }
    assert_eq!(
        lines,
        vec!["git status", "git commit -m wip", "git commit -m wip --amend"]
    );
}

#[test]
fn aborted_session_ends_as_eof_with_an_empty_buffer() {
    let mut kernel = LineEditorKernel::new(TokenizeConfig::default(), ComparePolicy::Caseless);
    kernel.add_module(Box::new(CoreEditModule::new()));
    let mut script = NoopScriptHost::new();
    kernel.begin_line(&mut script);

    feed(&mut kernel, &mut script, b"partial line");
    kernel.dispatch_abort();

    assert!(!kernel.is_editing());
    assert!(kernel.is_eof());
    assert_eq!(kernel.text(), "");
}
