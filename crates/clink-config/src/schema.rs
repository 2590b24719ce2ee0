//! Typed setting values for the persisted settings schema.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    DupeMode,
    ExpandMode,
    IgnoreCase,
    EscMode,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::DupeMode => "enum(dupe_mode)",
            ValueType::ExpandMode => "enum(expand_mode)",
            ValueType::IgnoreCase => "enum(ignore_case)",
            ValueType::EscMode => "enum(esc)",
        }
    }
}

/// `history.dupe_mode`: how a line matching prior history is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupeMode {
    Add,
    Ignore,
    ErasePrev,
}

/// `history.expand_mode`: scope of bash-style `!` history expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    Off,
    On,
    NotSquoted,
    NotDquoted,
    NotQuoted,
}

/// `match.ignore_case`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreCase {
    Off,
    On,
    Relaxed,
}

/// `input.esc`: what the bare Escape key surfaces as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscMode {
    Raw,
    CtrlC,
    RevertLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    DupeMode(DupeMode),
    ExpandMode(ExpandMode),
    IgnoreCase(IgnoreCase),
    EscMode(EscMode),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::DupeMode(_) => ValueType::DupeMode,
            Value::ExpandMode(_) => ValueType::ExpandMode,
            Value::IgnoreCase(_) => ValueType::IgnoreCase,
            Value::EscMode(_) => ValueType::EscMode,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::DupeMode(m) => {
                match m {
                    DupeMode::Add => "add",
                    DupeMode::Ignore => "ignore",
                    DupeMode::ErasePrev => "erase_prev",
                }
            }
            .to_string(),
            Value::ExpandMode(m) => {
                match m {
                    ExpandMode::Off => "off",
                    ExpandMode::On => "on",
                    ExpandMode::NotSquoted => "not_squoted",
                    ExpandMode::NotDquoted => "not_dquoted",
                    ExpandMode::NotQuoted => "not_quoted",
                }
            }
            .to_string(),
            Value::IgnoreCase(m) => {
                match m {
                    IgnoreCase::Off => "off",
                    IgnoreCase::On => "on",
                    IgnoreCase::Relaxed => "relaxed",
                }
            }
            .to_string(),
            Value::EscMode(m) => {
                match m {
                    EscMode::Raw => "raw",
                    EscMode::CtrlC => "ctrl_c",
                    EscMode::RevertLine => "revert_line",
                }
            }
            .to_string(),
        }
    }

    pub fn from_text(ty: ValueType, text: &str) -> Option<Value> {
        match ty {
            ValueType::Bool => text.parse::<bool>().ok().map(Value::Bool),
            ValueType::Int => text.parse::<i64>().ok().map(Value::Int),
            ValueType::DupeMode => Some(Value::DupeMode(match text {
                "add" => DupeMode::Add,
                "ignore" => DupeMode::Ignore,
                "erase_prev" => DupeMode::ErasePrev,
                _ => return None,
            })),
            ValueType::ExpandMode => Some(Value::ExpandMode(match text {
                "off" => ExpandMode::Off,
                "on" => ExpandMode::On,
                "not_squoted" => ExpandMode::NotSquoted,
                "not_dquoted" => ExpandMode::NotDquoted,
                "not_quoted" => ExpandMode::NotQuoted,
                _ => return None,
            })),
            ValueType::IgnoreCase => Some(Value::IgnoreCase(match text {
                "off" => IgnoreCase::Off,
                "on" => IgnoreCase::On,
                "relaxed" => IgnoreCase::Relaxed,
                _ => return None,
            })),
            ValueType::EscMode => Some(Value::EscMode(match text {
                "raw" => EscMode::Raw,
                "ctrl_c" => EscMode::CtrlC,
                "revert_line" => EscMode::RevertLine,
                _ => return None,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_for_every_variant() {
        let cases = [
            Value::Bool(true),
            Value::Int(-7),
            Value::DupeMode(DupeMode::ErasePrev),
            Value::ExpandMode(ExpandMode::NotDquoted),
            Value::IgnoreCase(IgnoreCase::On),
            Value::EscMode(EscMode::CtrlC),
        ];
        for value in cases {
            let text = value.to_text();
            assert_eq!(Value::from_text(value.ty(), &text), Some(value));
        }
    }

    #[test]
    fn from_text_rejects_unknown_enum_token() {
        assert_eq!(Value::from_text(ValueType::DupeMode, "bogus"), None);
    }
}
