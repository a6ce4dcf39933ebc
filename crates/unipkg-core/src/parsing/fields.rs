/// `Key: value` blocks as printed by `winget show`, `choco info`, `pip show`
/// and `Format-List`. A block continues over following lines that are
/// indented deeper than its key, or that do not look like a key themselves.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

struct OpenBlock {
    key: String,
    value: String,
    indent: usize,
}

impl Fields {
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        let mut current: Option<OpenBlock> = None;

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start().len();

            // A header such as `Installer:` opens a nested group of keys;
            // anything else indented under a key is part of its value.
            if let Some(block) = current.as_mut()
                && indent > block.indent
                && !(block.value.is_empty() && split_key(trimmed).is_some())
            {
                append_line(&mut block.value, trimmed);
                continue;
            }

            match split_key(trimmed) {
                Some((key, value)) => {
                    if let Some(done) = current.take() {
                        entries.push((done.key, done.value));
                    }
                    current = Some(OpenBlock {
                        key: key.to_string(),
                        value: value.to_string(),
                        indent,
                    });
                }
                None => {
                    if let Some(block) = current.as_mut() {
                        append_line(&mut block.value, trimmed);
                    }
                }
            }
        }

        if let Some(done) = current {
            entries.push((done.key, done.value));
        }
        Self { entries }
    }

    /// First value stored under `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Like `get`, but an absent key reads as empty.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn append_line(value: &mut String, line: &str) {
    if !value.is_empty() {
        value.push('\n');
    }
    value.push_str(line);
}

fn split_key(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let key = line[..colon].trim_end();
    let rest = &line[colon + 1..];
    if !(rest.is_empty() || rest.starts_with(' ')) {
        return None;
    }
    let looks_like_key = !key.is_empty()
        && key.len() <= 40
        && key.chars().next().is_some_and(char::is_alphabetic)
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')' | '.'));
    looks_like_key.then(|| (key, rest.trim()))
}

/// Splits a multi-line or whitespace-separated tag value.
pub fn split_tags(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == '\n' || c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Fields, split_tags};

    #[test]
    fn indented_lines_continue_the_previous_key() {
        let fields = Fields::parse(
            "Found Git [Git.Git]\nVersion: 2.44.0\nRelease Notes:\n  Line one\n  Line two\nTags:\n  bash\n  git\nInstaller:\n  Installer Type: inno\n",
        );
        assert_eq!(fields.get("version"), Some("2.44.0"));
        assert_eq!(fields.get("Release Notes"), Some("Line one\nLine two"));
        assert_eq!(split_tags(fields.value("Tags")), vec!["bash", "git"]);
        assert_eq!(fields.get("Installer"), Some(""));
        assert_eq!(fields.get("Installer Type"), Some("inno"));
    }

    #[test]
    fn urls_are_not_mistaken_for_keys() {
        let fields = Fields::parse(" Description: first\n https://example.com/x\n Summary: s\n");
        assert_eq!(fields.get("Description"), Some("first\nhttps://example.com/x"));
        assert_eq!(fields.get("Summary"), Some("s"));
        assert_eq!(fields.value("Missing"), "");
    }
}
