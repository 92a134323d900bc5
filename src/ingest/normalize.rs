use crate::ingest::flatten::{FieldKey, FieldMap};

/// Canonical field and the source keys it can be derived from, best first.
/// Keys are compared lowercase.
const ALIASES: &[(&str, &[&str])] = &[
    ("camera_make", &["camera_make", "make"]),
    ("camera_model", &["camera_model", "model"]),
    ("lens", &["lens", "lens_model", "lensmodel", "lens_id", "lensid"]),
    ("format", &["format", "file_type", "filetype"]),
    ("width", &["width", "image_width", "imagewidth", "exif_image_width"]),
    ("height", &["height", "image_height", "imageheight", "exif_image_height"]),
    ("date_taken", &["date_taken", "datetime_original", "datetimeoriginal", "create_date", "createdate"]),
    ("iso", &["iso", "iso_speed", "isospeedratings"]),
];

/// Normalized fields derivable from the other categories of the document.
///
/// Values the document already put under `normalized_category` win and are
/// not repeated here. Otherwise aliases are tried in order and, per alias,
/// categories in sorted order.
pub fn normalized_fields(fields: &FieldMap, normalized_category: &str) -> FieldMap {
    let mut derived = FieldMap::new();

    for (canonical, aliases) in ALIASES {
        let target = FieldKey::new(normalized_category, *canonical);
        if fields.contains_key(&target) {
            continue;
        }
        let found = aliases.iter().find_map(|alias| {
            fields
                .iter()
                .filter(|(k, _)| k.category != normalized_category)
                .find(|(k, _)| k.key.to_ascii_lowercase() == *alias)
                .map(|(_, v)| v.clone())
        });
        if let Some(value) = found {
            derived.insert(target, value);
        }
    }

    derived
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str, &str)]) -> FieldMap {
        entries
            .iter()
            .map(|(c, k, v)| (FieldKey::new(*c, *k), v.to_string()))
            .collect()
    }

    #[test]
    fn test_alias_priority() {
        let mut fields = map(&[
            ("exif", "Make", "NIKON"),
            ("xmp", "camera_make", "Nikon Corp"),
            ("exif", "ImageWidth", "4000"),
        ]);
        let derived = normalized_fields(&fields, "normalized");
        fields.extend(derived);
        assert_eq!(fields[&FieldKey::new("normalized", "camera_make")], "Nikon Corp");
        assert_eq!(fields[&FieldKey::new("normalized", "width")], "4000");
        assert!(!fields.contains_key(&FieldKey::new("normalized", "height")));
    }

    #[test]
    fn test_explicit_normalized_wins() {
        let mut fields = map(&[
            ("exif", "make", "Canon"),
            ("normalized", "camera_make", "Canon Inc."),
        ]);
        let derived = normalized_fields(&fields, "normalized");
        fields.extend(derived);
        assert_eq!(fields[&FieldKey::new("normalized", "camera_make")], "Canon Inc.");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_category_order_breaks_ties() {
        let mut fields = map(&[("b", "iso", "200"), ("a", "iso", "100")]);
        let derived = normalized_fields(&fields, "normalized");
        fields.extend(derived);
        assert_eq!(fields[&FieldKey::new("normalized", "iso")], "100");
    }

    #[test]
    fn test_normalized_fields_only_returns_derived() {
        let fields = map(&[
            ("exif", "make", "Canon"),
            ("exif", "iso", "100"),
            ("normalized", "lens", "EF 50mm"),
        ]);
        let derived = normalized_fields(&fields, "normalized");
        assert_eq!(derived, map(&[("normalized", "camera_make", "Canon"), ("normalized", "iso", "100")]));
    }
}
