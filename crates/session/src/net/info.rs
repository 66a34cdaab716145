use crate::protocol::BIG_INFO_STRING;

pub fn info_value<'a>(info: &'a str, key: &str) -> &'a str {
    info_pairs(info)
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
        .unwrap_or("")
}

pub fn info_pairs(info: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut parts = info.strip_prefix('\\').unwrap_or(info).split('\\');
    std::iter::from_fn(move || {
        let key = parts.next()?;
        let value = parts.next().unwrap_or("");
        Some((key, value))
    })
    .filter(|(key, _)| !key.is_empty())
}

pub fn remove_info_key(info: &mut String, key: &str) -> bool {
    let before = info.len();
    let kept: String = info_pairs(info.as_str())
        .filter(|(k, _)| !k.eq_ignore_ascii_case(key))
        .map(|(k, v)| format!("\\{}\\{}", k, v))
        .collect();
    *info = kept;
    info.len() != before
}

/// Returns false if the key or value is unusable or the result would be too long.
pub fn set_info_value(info: &mut String, key: &str, value: &str, max_len: usize) -> bool {
    const FORBIDDEN: [char; 3] = ['\\', ';', '"'];
    if key.is_empty() || key.contains(FORBIDDEN) || value.contains(FORBIDDEN) {
        log::warn!("Can't use keys or values with a \\, ; or \": {} = {}", key, value);
        return false;
    }

    let mut updated = info.clone();
    remove_info_key(&mut updated, key);
    if !value.is_empty() {
        updated.push_str(&format!("\\{}\\{}", key, value));
    }
    if updated.len() >= max_len.min(BIG_INFO_STRING) {
        log::warn!("Info string length exceeded setting {}", key);
        return false;
    }
    *info = updated;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let info = "\\hostname\\Arena\\mapname\\q3dm17\\clients\\3";
        assert_eq!(info_value(info, "MapName"), "q3dm17");
        assert_eq!(info_value(info, "clients"), "3");
        assert_eq!(info_value(info, "missing"), "");
    }

    #[test]
    fn set_replaces_existing_key() {
        let mut info = String::from("\\name\\player\\rate\\25000");
        assert!(set_info_value(&mut info, "rate", "90000", 1024));
        assert_eq!(info_value(&info, "rate"), "90000");
        assert_eq!(info_value(&info, "name"), "player");
        assert_eq!(info_pairs(&info).count(), 2);
    }

    #[test]
    fn set_rejects_separators() {
        let mut info = String::new();
        assert!(!set_info_value(&mut info, "na\\me", "x", 1024));
        assert!(!set_info_value(&mut info, "name", "a;b", 1024));
        assert!(info.is_empty());
    }
}
