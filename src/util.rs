use serde_json::Value;

/// The todays-price export feed occasionally emits a stray `",` sequence that
/// breaks CSV quoting. Strip it before handing the text to the CSV reader,
/// matching the upstream feed's known quirk.
pub fn clean_export_csv(text: &str) -> String {
    text.replace("\",", "")
}

/// Render a JSON cell as raw trimmed text. No numeric coercion here; that is
/// a downstream concern.
pub fn json_cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_export_csv_strips_stray_quote_comma() {
        let raw = "SYMBOL,LTP\nNABIL\",,1000\n";
        assert_eq!(clean_export_csv(raw), "SYMBOL,LTP\nNABIL,1000\n");
    }

    #[test]
    fn json_cell_text_renders_scalars() {
        assert_eq!(json_cell_text(&json!("  NABIL ")), "NABIL");
        assert_eq!(json_cell_text(&json!(1250.5)), "1250.5");
        assert_eq!(json_cell_text(&json!(null)), "");
        assert_eq!(json_cell_text(&json!(42)), "42");
    }
}
