use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::VendorLookup;

/// OUI vendor table loaded from `<prefix> <vendor>` lines (`data/oui.txt`).
/// No remote fallback exists for this deployment; a miss on the local
/// table simply yields `None` (see DESIGN.md).
pub struct FileVendorLookup {
    table: HashMap<String, String>,
}

impl FileVendorLookup {
    pub fn load(path: &Path) -> Self {
        let mut table = HashMap::new();
        if let Ok(text) = fs::read_to_string(path) {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((prefix, vendor)) = line.split_once(char::is_whitespace) {
                    table.insert(normalize_prefix(prefix), vendor.trim().to_string());
                }
            }
        }
        FileVendorLookup { table }
    }

    pub fn empty() -> Self {
        FileVendorLookup {
            table: HashMap::new(),
        }
    }
}

/// Strips `:`/`-` separators and lowercases, then keeps the first 6 hex
/// digits (the 24-bit OUI prefix), accepting any common separator style.
fn normalize_prefix(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_lowercase();
    stripped.chars().take(6).collect()
}

impl VendorLookup for FileVendorLookup {
    fn vendor(&self, mac: &str) -> Option<String> {
        let key = normalize_prefix(mac);
        if key.len() < 6 {
            return None;
        }
        self.table.get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_prefix_regardless_of_separator_style() {
        let mut table = HashMap::new();
        table.insert("001122".to_string(), "Acme".to_string());
        let lookup = FileVendorLookup { table };
        assert_eq!(
            lookup.vendor("00:11:22:33:44:55"),
            Some("Acme".to_string())
        );
        assert_eq!(
            lookup.vendor("00-11-22-33-44-55"),
            Some("Acme".to_string())
        );
        assert_eq!(lookup.vendor("001122334455"), Some("Acme".to_string()));
    }

    #[test]
    fn unknown_prefix_is_none() {
        let lookup = FileVendorLookup::empty();
        assert_eq!(lookup.vendor("aa:bb:cc:dd:ee:ff"), None);
    }
}
