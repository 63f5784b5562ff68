use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::session::Poi;

pub const LOC_DELIMITER: &str = "<<<LOC>>>";

// Shortest span between two delimiters, across lines.
static LOC_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<<<LOC>>>(.*?)<<<LOC>>>").unwrap());

/// Splits a raw model reply into visible text and the pins hidden in the
/// first `<<<LOC>>>` block, if any. The block is removed from the text in
/// every case, including unparseable JSON (which is logged and yields no
/// pins); text without delimiters passes through untouched.
pub fn split_poi_block(raw: &str) -> (String, Vec<Poi>) {
    let Some(found) = LOC_BLOCK.find(raw) else {
        return (raw.to_string(), Vec::new());
    };

    let inner = &raw[found.start() + LOC_DELIMITER.len()..found.end() - LOC_DELIMITER.len()];
    let text = format!("{}{}", &raw[..found.start()], &raw[found.end()..])
        .trim()
        .to_string();

    let pois = match serde_json::from_str::<Value>(inner) {
        Ok(value) => collect_pois(value),
        Err(err) => {
            log::warn!("unparseable location block dropped: {err}");
            Vec::new()
        }
    };

    (text, pois)
}

fn collect_pois(value: Value) -> Vec<Poi> {
    let entries = match value {
        Value::Array(entries) => entries,
        // legacy single-object block
        other => vec![other],
    };

    let mut pois = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<Poi>(entry) {
            Ok(poi) if poi.title.trim().is_empty() => {
                log::warn!("untitled location entry dropped ({}, {})", poi.lat, poi.lng);
            }
            Ok(poi) => pois.push(poi),
            Err(err) => log::warn!("malformed location entry dropped: {err}"),
        }
    }
    pois
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PoiCategory;

    #[test]
    fn block_is_extracted_and_text_rejoined() {
        let block = r#"<<<LOC>>>[{"lat":31.5,"lng":74.3,"title":"X","category":"bank"}]<<<LOC>>>"#;
        let raw = format!("Here is info. {block} More text.");

        let (text, pois) = split_poi_block(&raw);
        assert_eq!(text, "Here is info.  More text.");
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].title, "X");
        assert_eq!(pois[0].category, PoiCategory::Bank);
        assert_eq!(pois[0].lat, 31.5);
        assert_eq!(pois[0].lng, 74.3);
    }

    #[test]
    fn unknown_category_falls_back_to_default() {
        let raw = r#"<<<LOC>>>[{"lat":31.5,"lng":74.3,"title":"X","category":"spaceship"}]<<<LOC>>>"#;
        let (_, pois) = split_poi_block(raw);
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].category, PoiCategory::Default);
    }

    #[test]
    fn missing_category_is_default() {
        let raw = r#"<<<LOC>>>[{"lat":1.0,"lng":2.0,"title":"Y"}]<<<LOC>>>"#;
        let (_, pois) = split_poi_block(raw);
        assert_eq!(pois[0].category, PoiCategory::Default);
    }

    #[test]
    fn text_without_delimiters_passes_through() {
        let raw = "No map data here, just words.";
        let (text, pois) = split_poi_block(raw);
        assert_eq!(text, raw);
        assert!(pois.is_empty());
    }

    #[test]
    fn invalid_json_strips_the_block_and_yields_nothing() {
        let raw = r#"Answer. <<<LOC>>>[{"lat":31.5,<<<LOC>>> trailing"#;
        let (text, pois) = split_poi_block(raw);
        assert_eq!(text, "Answer.  trailing");
        assert!(pois.is_empty());
    }

    #[test]
    fn legacy_single_object_becomes_one_entry() {
        let raw = r#"<<<LOC>>>{"lat":1,"lng":2,"title":"Y"}<<<LOC>>>"#;
        let (text, pois) = split_poi_block(raw);
        assert_eq!(text, "");
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].title, "Y");
    }

    #[test]
    fn only_the_first_block_is_used() {
        let raw = concat!(
            r#"<<<LOC>>>[{"lat":1,"lng":2,"title":"first"}]<<<LOC>>>"#,
            " and ",
            r#"<<<LOC>>>[{"lat":3,"lng":4,"title":"second"}]<<<LOC>>>"#,
        );
        let (text, pois) = split_poi_block(raw);
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].title, "first");
        // the second block stays in the visible text
        assert!(text.contains("second"));
    }

    #[test]
    fn bad_entries_are_dropped_without_losing_good_ones() {
        let raw = concat!(
            "<<<LOC>>>[",
            r#"{"lat":"not a number","lng":2,"title":"bad"},"#,
            r#"{"lat":1,"lng":2,"title":"  "},"#,
            r#"{"lng":2,"title":"missing lat"},"#,
            r#"{"lat":31.48,"lng":74.3,"title":"Jinnah Hospital","category":"hospital"}"#,
            "]<<<LOC>>>"
        );
        let (_, pois) = split_poi_block(raw);
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].title, "Jinnah Hospital");
        assert_eq!(pois[0].category, PoiCategory::Hospital);
    }

    #[test]
    fn multiline_block_is_matched() {
        let raw = "Before\n<<<LOC>>>[\n{\"lat\":1,\"lng\":2,\"title\":\"Y\"}\n]<<<LOC>>>\nAfter";
        let (text, pois) = split_poi_block(raw);
        assert_eq!(pois.len(), 1);
        assert_eq!(text, "Before\n\nAfter");
    }
}
