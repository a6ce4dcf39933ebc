const ANNOTATED_SUFFIXES: &[(&str, &str)] = &[(".install", " (Install)"), (".portable", " (Portable)")];

/// Turns a package identifier into a display name:
/// `visual-studio-code.install` becomes `Visual Studio Code (Install)`.
pub fn format_package_id_as_name(id: &str) -> String {
    let id = id.trim();
    let lowered = id.to_ascii_lowercase();
    let (base, annotation) = ANNOTATED_SUFFIXES
        .iter()
        .find(|(suffix, _)| lowered.ends_with(suffix) && lowered.len() > suffix.len())
        .map(|(suffix, annotation)| (&id[..id.len() - suffix.len()], *annotation))
        .unwrap_or((id, ""));

    let words: Vec<String> = base
        .split(['-', '_', '.'])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();

    format!("{}{annotation}", words.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
