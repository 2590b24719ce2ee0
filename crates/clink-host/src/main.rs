//! Host harness entry point: wires the line-editor kernel, the history
//! store, terminal I/O, and the settings registry together behind the
//! `initialise` / `shutdown` call sequence a real attachment shim would
//! drive after patching the host shell's `ReadConsoleW`.
//! `history`/`set`/`info`/`inject` subcommands, the script-language
//! binding, and alias-table access are out-of-scope collaborators here —
//! this binary is deliberately thin: it runs the library's cooperative
//! edit loop once per invocation so the core can be exercised without a
//! patched host process.
//!
//! Retargeted from a modal multi-line editor's startup/logging/panic-hook
//! shape to a single-line `begin_line`/`step_byte`/`draw` contract.

use std::path::PathBuf;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use clink_config::{DupeMode, EscMode, ExpandMode, IgnoreCase, SessionDescriptor, Value, load_from};
use clink_editor::{
    Context as EditorContext, CoreEditModule, DispatchResult, EditorModule, Input,
    LineEditorKernel, ModuleBinder, TokenizeConfig,
};
use clink_events::{EVENT_CHANNEL_CAP, Event};
use clink_history::{HistoryDb, HistoryOptions};
use clink_input::{InputSource, SelectOutcome, spawn_async_input};
use clink_matches::ComparePolicy;
use clink_script::{NoopScriptHost, ScriptHost};
use clink_terminal::keys::{EscPolicy, ReadResult};
use clink_terminal::{CrosstermBackend, TerminalBackend, TerminalGuard, Writer};

const PROMPT_ROW: u16 = 0;

/// CLI arguments. Intentionally thin: this is a harness, not the `clink`
/// subcommand surface.
#[derive(Parser, Debug)]
#[command(name = "clink", version, about = "Clink line-editor harness")]
struct Args {
    /// Override the persisted-state directory (defaults per
    /// `SessionDescriptor::discover_state_dir`).
    #[arg(long = "profile")]
    profile: Option<PathBuf>,
    /// Prompt text drawn before the edited line.
    #[arg(long = "prompt", default_value = "$ ")]
    prompt: String,
    /// Suppress non-error log output (the file log is still written in full).
    #[arg(long)]
    quiet: bool,
    /// Attempt the real host-attachment hook before editing. Off by
    /// default: a standalone harness has no live host shell to patch, so
    /// this exists to exercise the hook-failure contract rather than
    /// fabricate success. Do not point this at a live shell without also
    /// wiring an ABI-compatible `ReadConsoleW` replacement.
    #[arg(long)]
    attach: bool,
}

/// Idempotency guard for [`initialise`]/[`shutdown`]: `shutdown()` must be
/// safe to call more than once.
static INITIALISED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = crossterm::terminal::disable_raw_mode();
            default_hook(info);
        }));
    });
}

fn configure_logging(desc: &SessionDescriptor, quiet: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&desc.state_dir)
        .with_context(|| format!("creating state dir {}", desc.state_dir.display()))?;
    let appender = tracing_appender::rolling::never(&desc.state_dir, "clink.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_new(&desc.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false);
    if quiet {
        let _ = builder.with_target(false).try_init();
    } else {
        let _ = builder.try_init();
    }
    Ok(guard)
}

/// Placeholder target for the `--attach` demonstration hook: a real
/// attachment shim replaces this with an ABI-compatible `ReadConsoleW` that
/// forwards into this crate's edit loop and the original via the returned
/// trampoline.
extern "system" fn host_read_console_hook() {}

/// Host-embedding entry point: prepares persisted state and, when
/// requested, installs the host-attachment hook. Idempotent; a second call
/// is a no-op success.
fn initialise(desc: &SessionDescriptor, attach: bool) -> bool {
    if INITIALISED.load(Ordering::SeqCst) {
        return true;
    }
    info!(target: "runtime", state_dir = %desc.state_dir.display(), "initialise");

    if let Err(err) = std::fs::create_dir_all(&desc.state_dir) {
        warn!(target: "runtime", error = %err, "failed to create state dir");
        return false;
    }

    if attach {
        // A hook failure returns null; the attaching shim logs and
        // refuses to initialise.
        let placeholder = host_read_console_hook as usize;
        match clink_hook::hook_jmp_export("kernel32.dll", "ReadConsoleW", placeholder) {
            Ok(trampoline) => {
                info!(target: "hook", trampoline, "installed host-attachment hook");
            }
            Err(err) => {
                warn!(target: "hook", error = %err, "host-attachment hook failed, refusing to initialise");
                return false;
            }
        }
    }

    INITIALISED.store(true, Ordering::SeqCst);
    true
}

/// Idempotent teardown. Alias-table cleanup is an out-of-scope
/// collaborator interface — logged, not performed.
fn shutdown() {
    if !INITIALISED.swap(false, Ordering::SeqCst) {
        return;
    }
    info!(target: "runtime", "shutdown");
}

fn compare_policy_from(registry: &clink_config::SettingsRegistry) -> ComparePolicy {
    match registry.get("match.ignore_case") {
        Some(Value::IgnoreCase(IgnoreCase::Off)) => ComparePolicy::Exact,
        Some(Value::IgnoreCase(IgnoreCase::On)) => ComparePolicy::Caseless,
        _ => ComparePolicy::Relaxed,
    }
}

fn esc_policy_from(registry: &clink_config::SettingsRegistry) -> EscPolicy {
    match registry.get("input.esc") {
        Some(Value::EscMode(EscMode::CtrlC)) => EscPolicy::CtrlC,
        Some(Value::EscMode(EscMode::RevertLine)) => EscPolicy::RevertLine,
        _ => EscPolicy::Raw,
    }
}

fn history_options_from(registry: &clink_config::SettingsRegistry) -> HistoryOptions {
    let shared = matches!(registry.get("history.shared"), Some(Value::Bool(true)));
    let ignore_space = !matches!(registry.get("history.ignore_space"), Some(Value::Bool(false)));
    let dupe_mode = match registry.get("history.dupe_mode") {
        Some(Value::DupeMode(m)) => *m,
        _ => DupeMode::ErasePrev,
    };
    let expand_mode = match registry.get("history.expand_mode") {
        Some(Value::ExpandMode(m)) => *m,
        _ => ExpandMode::NotQuoted,
    };
    HistoryOptions {
        shared,
        ignore_space,
        dupe_mode,
        expand_mode,
    }
}

/// An inherited session-id variable read at init.
const SESSION_ID_ENV: &str = "CLINK_SESSION_ID";
/// A profile-path override read at init.
const PROFILE_ENV: &str = "CLINK_PROFILE";

fn resolve_session_id() -> String {
    if let Ok(id) = std::env::var(SESSION_ID_ENV) {
        if !id.is_empty() {
            return id;
        }
    }
    std::process::id().to_string()
}

fn resolve_state_dir(profile_arg: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = profile_arg {
        return dir;
    }
    if let Ok(dir) = std::env::var(PROFILE_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    SessionDescriptor::discover_state_dir()
}

mod nav_ids {
    pub const UP: u8 = 0;
    pub const DOWN: u8 = 1;
}

/// Up/Down history recall, loaded once at line begin. Not part of
/// `CoreEditModule`'s baseline keymap — a separate module the host layers
/// in alongside it, the way a real Clink host layers `rl_module`'s
/// history bindings over the core edit bindings.
struct HistoryNavModule {
    lines: Vec<String>,
    cursor: Option<usize>,
    saved: Option<String>,
}

impl HistoryNavModule {
    fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            cursor: None,
            saved: None,
        }
    }

    fn replace_line(ctx: &mut EditorContext, text: &str) {
        let len = ctx.buffer.text().len();
        ctx.buffer.remove(0, len);
        ctx.buffer.insert(text);
    }
}

impl EditorModule for HistoryNavModule {
    fn name(&self) -> &'static str {
        "history-nav"
    }

    fn bind_input(&mut self, binder: &mut ModuleBinder) {
        let group = binder.default_group();
        binder.bind(group, "\x1b[A", nav_ids::UP).unwrap();
        binder.bind(group, "\x1b[B", nav_ids::DOWN).unwrap();
    }

    fn on_begin_line(&mut self, _ctx: &mut EditorContext) {
        self.cursor = None;
        self.saved = None;
    }

    fn on_input(&mut self, input: &Input, result: &mut DispatchResult, ctx: &mut EditorContext) {
        match input.id {
            nav_ids::UP => {
                if self.lines.is_empty() {
                    result.pass();
                    return;
                }
                let next = match self.cursor {
                    None => self.lines.len() - 1,
                    Some(0) => 0,
                    Some(i) => i - 1,
                };
                if self.cursor.is_none() {
                    self.saved = Some(ctx.buffer.text().to_string());
                }
                self.cursor = Some(next);
                let text = self.lines[next].clone();
                Self::replace_line(ctx, &text);
                result.redraw();
            }
            nav_ids::DOWN => match self.cursor {
                None => result.pass(),
                Some(i) if i + 1 < self.lines.len() => {
                    self.cursor = Some(i + 1);
                    let text = self.lines[i + 1].clone();
                    Self::replace_line(ctx, &text);
                    result.redraw();
                }
                Some(_) => {
                    self.cursor = None;
                    let text = self.saved.take().unwrap_or_default();
                    Self::replace_line(ctx, &text);
                    result.redraw();
                }
            },
            _ => result.pass(),
        }
    }
}

fn redraw_prompt(prompt: &str, text: &str, cursor: usize) -> Result<()> {
    let col = clink_text::str_cell_count(prompt) as u16 + clink_text::str_cell_count(&text[..cursor]) as u16;
    let mut writer = Writer::new();
    writer.move_to(0, PROMPT_ROW);
    writer.clear_line(PROMPT_ROW);
    writer.print(format!("{prompt}{text}"));
    writer.move_to(col, PROMPT_ROW);
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    install_panic_hook();

    let state_dir = resolve_state_dir(args.profile.clone());
    let mut desc = SessionDescriptor::new(state_dir);
    desc.quiet = args.quiet;
    let session_id = resolve_session_id();
    desc.session_id = Some(session_id.clone());

    let _log_guard = configure_logging(&desc, args.quiet)?;

    if !initialise(&desc, args.attach) {
        anyhow::bail!("initialise failed, see {}", desc.state_dir.join("clink.log").display());
    }

    let registry = load_from(&desc.state_dir).context("loading settings")?;
    let compare_policy = compare_policy_from(&registry);
    let esc_policy = esc_policy_from(&registry);
    let history_options = history_options_from(&registry);

    let mut history = HistoryDb::initialise(&desc.state_dir, &session_id, history_options)
        .context("opening history store")?;

    let mut history_lines = Vec::new();
    {
        let mut iter = history.read_lines().context("iterating history")?;
        while let Some((_, text)) = iter.next().context("reading history line")? {
            history_lines.push(text);
        }
    }

    let mut kernel = LineEditorKernel::new(TokenizeConfig::default(), compare_policy);
    kernel.add_module(Box::new(CoreEditModule::new()));
    kernel.add_module(Box::new(HistoryNavModule::new(history_lines)));

    let mut backend = CrosstermBackend::new();
    let _ = backend.set_title("clink");
    let _guard = TerminalGuard::new(&mut backend).context("entering raw mode")?;
    // The backend hides the cursor on entry for its original full-screen
    // use; clink's inline single-line prompt needs it visible.
    let _ = crossterm::execute!(std::io::stdout(), crossterm::cursor::Show);

    let (tx, rx) = tokio::sync::mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let (input_task, shutdown_handle) = spawn_async_input(tx, esc_policy);
    let mut input = InputSource::new(rx);

    let mut script: Box<dyn ScriptHost> = Box::new(NoopScriptHost::new());
    kernel.begin_line(script.as_mut());
    redraw_prompt(&args.prompt, kernel.text(), 0)?;

    loop {
        match input.select().await {
            SelectOutcome::Input => {
                while let ReadResult::Byte(b) = input.read() {
                    kernel.step_byte(b, script.as_mut());
                    if !kernel.is_editing() {
                        break;
                    }
                }
            }
            SelectOutcome::Resize(cols, rows) => {
                kernel.dispatch_resize(cols, rows);
            }
            SelectOutcome::Abort => {
                kernel.dispatch_abort();
            }
            SelectOutcome::Tick => {}
        }

        if let Some((text, cursor)) = kernel.draw() {
            redraw_prompt(&args.prompt, text, cursor)?;
        }

        if !kernel.is_editing() {
            break;
        }
    }

    shutdown_handle.shutdown();
    let _ = input_task.await;

    if kernel.is_eof() {
        info!(target: "runtime", "edit session ended at EOF");
        println!();
    } else {
        let line = kernel.text().to_string();
        history.add(&line).context("appending to history")?;
        println!("{line}");
    }

    drop(_guard);
    shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clink_matches::ComparePolicy;

    #[test]
    fn compare_policy_defaults_to_relaxed() {
        let registry = clink_config::SettingsRegistry::with_defaults();
        assert_eq!(compare_policy_from(&registry), ComparePolicy::Relaxed);
    }

    #[test]
    fn esc_policy_defaults_to_raw() {
        let registry = clink_config::SettingsRegistry::with_defaults();
        assert_eq!(esc_policy_from(&registry), EscPolicy::Raw);
    }

    #[test]
    fn history_options_defaults_match_settings_registry() {
        let registry = clink_config::SettingsRegistry::with_defaults();
        let options = history_options_from(&registry);
        assert!(!options.shared);
        assert!(options.ignore_space);
        assert!(matches!(options.dupe_mode, DupeMode::ErasePrev));
        assert!(matches!(options.expand_mode, ExpandMode::NotQuoted));
    }

    #[test]
    fn resolve_state_dir_prefers_explicit_arg() {
        let dir = resolve_state_dir(Some(PathBuf::from("/tmp/explicit-clink-profile")));
        assert_eq!(dir, PathBuf::from("/tmp/explicit-clink-profile"));
    }

    fn kernel_with_history(lines: Vec<&str>) -> LineEditorKernel {
        let mut kernel = LineEditorKernel::new(TokenizeConfig::default(), ComparePolicy::Caseless);
        kernel.add_module(Box::new(CoreEditModule::new()));
        kernel.add_module(Box::new(HistoryNavModule::new(
            lines.into_iter().map(str::to_string).collect(),
        )));
        let mut script = NoopScriptHost::new();
        kernel.begin_line(&mut script);
        kernel
    }

    fn feed(kernel: &mut LineEditorKernel, bytes: &[u8]) {
        let mut script = NoopScriptHost::new();
        for &b in bytes {
            kernel.step_byte(b, &mut script);
        }
    }

    #[test]
    fn up_arrow_recalls_most_recent_history_entry_first() {
        let mut kernel = kernel_with_history(vec!["first", "second"]);
        feed(&mut kernel, b"\x1b[A");
        assert_eq!(kernel.text(), "second");
        feed(&mut kernel, b"\x1b[A");
        assert_eq!(kernel.text(), "first");
    }

    #[test]
    fn down_arrow_past_the_most_recent_entry_restores_the_in_progress_line() {
        let mut kernel = kernel_with_history(vec!["first", "second"]);
        feed(&mut kernel, b"wip");
        feed(&mut kernel, b"\x1b[A");
        assert_eq!(kernel.text(), "second");
        feed(&mut kernel, b"\x1b[B");
        assert_eq!(kernel.text(), "wip");
    }

    #[test]
    fn up_arrow_with_empty_history_passes_through() {
        let mut kernel = kernel_with_history(vec![]);
        feed(&mut kernel, b"\x1b[A");
        assert_eq!(kernel.text(), "");
        assert!(kernel.is_editing());
    }
}
