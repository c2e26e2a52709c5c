//! `_XKB_RULES_NAMES` root property parsing.
//!
//! The property holds five NUL-terminated strings: rules, model,
//! layouts, variants and options. Layouts and variants are
//! comma-separated, one entry per XKB group.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesNames {
    pub rules: String,
    pub model: String,
    pub layouts: Vec<String>,
    pub variants: Vec<String>,
    pub options: String,
}

impl RulesNames {
    /// Parse the raw property value. Missing trailing fields are empty.
    pub fn parse(data: &[u8]) -> Self {
        let mut fields = data
            .split(|b| *b == 0)
            .map(|s| String::from_utf8_lossy(s).into_owned());
        let mut next = || fields.next().unwrap_or_default();

        let rules = next();
        let model = next();
        let layouts = split_list(&next());
        let variants = split_list(&next());
        let options = next();
        Self {
            rules,
            model,
            layouts,
            variants,
            options,
        }
    }

    /// `(layout, variant)` for an XKB group, if the property names one.
    pub fn group(&self, group: usize) -> Option<(&str, &str)> {
        let layout = self.layouts.get(group).filter(|l| !l.is_empty())?;
        let variant = self.variants.get(group).map(String::as_str).unwrap_or("");
        Some((layout, variant))
    }
}

fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').map(str::to_owned).collect()
}
