//! Shape-agnostic lookups in Yahoo JSON payloads.
//!
//! Yahoo nests its resources in numbered objects and arrays of single-key
//! maps, so fields are located by searching the whole tree.

use serde_json::Value;

use crate::Season;

/// First value under `key`, depth first.
pub fn find_first<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return Some(found);
            }
            map.values().find_map(|v| find_first(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_first(v, key)),
        _ => None,
    }
}

/// Every string (or number) stored under `key`, deduplicated in first-seen order.
pub fn collect_strings(value: &Value, key: &str) -> Vec<String> {
    let mut out = Vec::new();
    collect_into(value, key, &mut out);
    out
}

fn collect_into(value: &Value, key: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    if let Some(s) = scalar_string(v) {
                        if !out.contains(&s) {
                            out.push(s);
                        }
                        continue;
                    }
                }
                collect_into(v, key, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_into(v, key, out)),
        _ => {}
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First string-ish value under `key`.
pub fn find_string(value: &Value, key: &str) -> Option<String> {
    find_first(value, key).and_then(scalar_string)
}

/// The season a league payload belongs to.
pub fn find_season(value: &Value) -> Option<Season> {
    find_string(value, "season").and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn league_payload() -> Value {
        json!({
            "fantasy_content": {
                "league": [
                    {"league_key": "453.l.33099", "name": "Puck Luck", "season": "2024"},
                    {"teams": {
                        "0": {"team": [[{"team_key": "453.l.33099.t.1"}, {"name": "Team One"}],
                                       {"roster": {"0": {"players": {
                                           "0": {"player": [[{"player_key": "453.p.6743"}]]},
                                           "1": {"player": [[{"player_key": "453.p.5000"}]]}
                                       }}}}]},
                        "1": {"team": [[{"team_key": "453.l.33099.t.2"}],
                                       {"roster": {"0": {"players": {
                                           "0": {"player": [[{"player_key": "453.p.6743"}]]}
                                       }}}}]},
                        "count": 2
                    }}
                ]
            }
        })
    }

    #[test]
    fn test_find_season_and_name() {
        let payload = league_payload();
        assert_eq!(find_season(&payload), Some(Season::new(2024)));
        assert_eq!(find_string(&payload, "name").as_deref(), Some("Puck Luck"));
        assert_eq!(find_string(&payload, "missing"), None);
    }

    #[test]
    fn test_numeric_season() {
        assert_eq!(find_season(&json!({"season": 2023})), Some(Season::new(2023)));
    }

    #[test]
    fn test_collect_unique_in_order() {
        let payload = league_payload();
        assert_eq!(
            collect_strings(&payload, "player_key"),
            vec!["453.p.6743", "453.p.5000"]
        );
        assert_eq!(
            collect_strings(&payload, "team_key"),
            vec!["453.l.33099.t.1", "453.l.33099.t.2"]
        );
    }

    #[test]
    fn test_collect_nothing() {
        assert!(collect_strings(&json!([1, "a", null]), "player_key").is_empty());
    }
}
