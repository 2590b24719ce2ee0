//! The script-host boundary: the Lua-like language binding that runs user
//! completion/prompt scripts is an external collaborator. This crate only
//! fixes the trait surface the rest of the core calls through —
//! `generate`, `filter_prompt`, `get_prefix_length` — plus a no-op
//! implementation used until a real binding is wired in.

/// A fixed ABI boundary to the script host: `clink._generate`,
/// `clink._get_prefix_length`, `clink._filter_prompt`.
/// A script error is the script host's own problem: it prints the error
/// text itself and returns as if it produced nothing, so the pipeline
/// stage it backs is a no-op rather than a propagated failure.
pub trait ScriptHost: Send {
    /// Stable identifier for logs/diagnostics.
    fn name(&self) -> &'static str;

    /// Run user completion scripts against the current line, returning
    /// match candidates (as raw text; the caller is responsible for
    /// feeding them into the match pipeline).
    fn generate(&mut self, line: &str) -> Vec<String>;

    /// Run the prompt filter chain over `text`, returning the (possibly
    /// rewritten) prompt.
    fn filter_prompt(&mut self, text: &str) -> String;

    /// How many leading bytes of `line`'s end-word a script generator
    /// considers a fixed prefix.
    fn get_prefix_length(&mut self, line: &str) -> u32;
}

impl<T: ScriptHost + ?Sized> ScriptHost for &mut T {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn generate(&mut self, line: &str) -> Vec<String> {
        (**self).generate(line)
    }
    fn filter_prompt(&mut self, text: &str) -> String {
        (**self).filter_prompt(text)
    }
    fn get_prefix_length(&mut self, line: &str) -> u32 {
        (**self).get_prefix_length(line)
    }
}

/// No script binding attached: generates nothing, passes the prompt
/// through unchanged, and claims no fixed prefix.
#[derive(Default)]
pub struct NoopScriptHost;

impl NoopScriptHost {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptHost for NoopScriptHost {
    fn name(&self) -> &'static str {
        "noop-script-host"
    }
    fn generate(&mut self, _line: &str) -> Vec<String> {
        Vec::new()
    }
    fn filter_prompt(&mut self, text: &str) -> String {
        text.to_string()
    }
    fn get_prefix_length(&mut self, _line: &str) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_host_generates_nothing() {
        let mut host = NoopScriptHost::new();
        assert!(host.generate("git ch").is_empty());
    }

    #[test]
    fn noop_host_passes_prompt_through() {
        let mut host = NoopScriptHost::new();
        assert_eq!(host.filter_prompt("$ "), "$ ");
    }

    #[test]
    fn noop_host_claims_no_fixed_prefix() {
        let mut host = NoopScriptHost::new();
        assert_eq!(host.get_prefix_length("git ch"), 0);
    }

    #[test]
    fn mut_ref_blanket_impl_forwards_calls() {
        let mut host = NoopScriptHost::new();
        let mut host_ref: &mut dyn ScriptHost = &mut host;
        assert_eq!(host_ref.name(), "noop-script-host");
        assert_eq!(host_ref.filter_prompt("x"), "x");
    }
}
