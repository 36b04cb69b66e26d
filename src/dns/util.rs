/// Join labels into a lowercase dotted name. The root zone is ".".
pub fn name_from_labels(labels: &[String]) -> String {
    if labels.is_empty() {
        return ".".to_string();
    }
    let mut name = String::with_capacity(64);
    for label in labels {
        if label.is_empty() {
            continue;
        }
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&label.to_lowercase());
    }
    if name.is_empty() { ".".to_string() } else { name }
}

/// Split a dotted name into labels. The root zone yields no labels.
pub fn labels_from_name(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Lowercase a presentation name into the canonical "." / "a.b.c" form.
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_lowercase()
    }
}

pub fn label_count(name: &str) -> usize {
    if name == "." {
        0
    } else {
        name.split('.').filter(|l| !l.is_empty()).count()
    }
}

/// Strip the leftmost label. "example.com" -> "com" -> "." -> None.
pub fn parent_name(name: &str) -> Option<String> {
    if name == "." {
        return None;
    }
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => Some(rest.to_string()),
        _ => Some(".".to_string()),
    }
}

/// True when `name` is `zone` or ends with it on a label boundary.
pub fn is_subdomain(name: &str, zone: &str) -> bool {
    if zone == "." {
        return true;
    }
    let name = normalize(name);
    let zone = normalize(zone);
    if name == zone {
        return true;
    }
    name.ends_with(&format!(".{}", zone))
}

/// Encode a name in lowercase uncompressed wire format, as required by
/// digest and signature computations (RFC 4034 §6.2).
pub fn canonical_wire_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.to_lowercase().as_bytes());
    }
    out.push(0);
    out
}
