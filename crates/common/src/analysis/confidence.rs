//! Routing confidence normalization to a 0-100 integer

use serde_json::Value;

/// Normalize a confidence value reported by the model.
///
/// Accepted shapes:
/// - numbers in `[0, 1]` are fractions (`0.85` -> 85, `1` -> 100)
/// - numbers above 1 are percentages (`85` -> 85), capped at 100
/// - strings holding either of the above, or a percentage (`"85%"`)
/// - qualitative labels (`high`, `medium`, `low`)
///
/// Anything else, negatives and NaN normalize to 0.
pub fn normalize_confidence(raw: &Value) -> u8 {
    match raw {
        Value::Number(n) => n.as_f64().map(scale).unwrap_or(0),
        Value::String(s) => parse_confidence_str(s),
        _ => 0,
    }
}

fn parse_confidence_str(s: &str) -> u8 {
    let trimmed = s.trim();

    if let Some(percent) = trimmed.strip_suffix('%') {
        return percent
            .trim()
            .parse::<f64>()
            .ok()
            .map(clamp_percent)
            .unwrap_or(0);
    }

    if let Ok(n) = trimmed.parse::<f64>() {
        return scale(n);
    }

    match trimmed.to_lowercase().as_str() {
        "very high" => 95,
        "high" => 85,
        "medium" | "moderate" => 60,
        "low" => 30,
        "very low" => 10,
        _ => 0,
    }
}

/// Fraction-or-percentage heuristic
pub fn scale(value: f64) -> u8 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else if value <= 1.0 {
        clamp_percent(value * 100.0)
    } else {
        clamp_percent(value)
    }
}

fn clamp_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fractions_and_percentages_agree() {
        assert_eq!(normalize_confidence(&json!(0.85)), 85);
        assert_eq!(normalize_confidence(&json!(85)), 85);
        assert_eq!(normalize_confidence(&json!("85%")), 85);
        assert_eq!(normalize_confidence(&json!("0.85")), 85);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(normalize_confidence(&json!(1)), 100);
        assert_eq!(normalize_confidence(&json!(1.0)), 100);
        assert_eq!(normalize_confidence(&json!(0)), 0);
        assert_eq!(normalize_confidence(&json!(250)), 100);
        assert_eq!(normalize_confidence(&json!(-0.4)), 0);
        assert_eq!(normalize_confidence(&json!("1%")), 1);
    }

    #[test]
    fn test_labels_and_garbage() {
        assert_eq!(normalize_confidence(&json!("High")), 85);
        assert_eq!(normalize_confidence(&json!("certain-ish")), 0);
        assert_eq!(normalize_confidence(&json!(null)), 0);
        assert_eq!(normalize_confidence(&json!([0.5])), 0);
    }
}
