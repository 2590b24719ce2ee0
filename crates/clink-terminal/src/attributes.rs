//! Character-cell attributes: fg/bg color, bold, underline, each with an
//! independent "has this field been set" bit so two `Attributes` can be
//! `merge`d (rhs wins where set) or `diff`ed (which fields differ) without
//! one clobbering fields the other never touched.

const SET_FG: u8 = 1 << 0;
const SET_BG: u8 = 1 << 1;
const SET_BOLD: u8 = 1 << 2;
const SET_UNDERLINE: u8 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Default,
    Palette(u8),
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    fg: Color,
    bg: Color,
    bold: bool,
    underline: bool,
    set_mask: u8,
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new()
    }
}

impl Attributes {
    pub fn new() -> Self {
        Self {
            fg: Color::Default,
            bg: Color::Default,
            bold: false,
            underline: false,
            set_mask: 0,
        }
    }

    pub fn with_fg(mut self, c: Color) -> Self {
        self.fg = c;
        self.set_mask |= SET_FG;
        self
    }

    pub fn with_bg(mut self, c: Color) -> Self {
        self.bg = c;
        self.set_mask |= SET_BG;
        self
    }

    pub fn with_bold(mut self, on: bool) -> Self {
        self.bold = on;
        self.set_mask |= SET_BOLD;
        self
    }

    pub fn with_underline(mut self, on: bool) -> Self {
        self.underline = on;
        self.set_mask |= SET_UNDERLINE;
        self
    }

    pub fn fg(&self) -> Color {
        self.fg
    }
    pub fn bg(&self) -> Color {
        self.bg
    }
    pub fn bold(&self) -> bool {
        self.bold
    }
    pub fn underline(&self) -> bool {
        self.underline
    }

    /// Combine `self` with `rhs`, with `rhs`'s explicitly-set fields
    /// overriding `self`'s.
    pub fn merge(&self, rhs: &Attributes) -> Attributes {
        let mut out = *self;
        if rhs.set_mask & SET_FG != 0 {
            out.fg = rhs.fg;
            out.set_mask |= SET_FG;
        }
        if rhs.set_mask & SET_BG != 0 {
            out.bg = rhs.bg;
            out.set_mask |= SET_BG;
        }
        if rhs.set_mask & SET_BOLD != 0 {
            out.bold = rhs.bold;
            out.set_mask |= SET_BOLD;
        }
        if rhs.set_mask & SET_UNDERLINE != 0 {
            out.underline = rhs.underline;
            out.set_mask |= SET_UNDERLINE;
        }
        out
    }

    /// True if any rendered field differs between `self` and `other`
    /// (fields neither side ever set compare equal by definition: both
    /// default to `Color::Default`/`false`).
    pub fn diff(&self, other: &Attributes) -> bool {
        self.fg != other.fg
            || self.bg != other.bg
            || self.bold != other.bold
            || self.underline != other.underline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overrides_only_set_fields() {
        let base = Attributes::new().with_fg(Color::Palette(1)).with_bold(true);
        let overlay = Attributes::new().with_bg(Color::Palette(4));
        let merged = base.merge(&overlay);
        assert_eq!(merged.fg(), Color::Palette(1));
        assert_eq!(merged.bg(), Color::Palette(4));
        assert!(merged.bold());
    }

    #[test]
    fn diff_detects_changed_fields() {
        let a = Attributes::new().with_bold(true);
        let b = Attributes::new().with_bold(false);
        assert!(a.diff(&b));
        assert!(!a.diff(&a.clone()));
    }
}
