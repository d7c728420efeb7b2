//! Document serialization

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts documents to and from their stored JSON text
pub trait Serializer: Send + Sync + 'static {
    fn to_json<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error>;

    fn from_json<T: DeserializeOwned>(&self, json: &str) -> Result<T, serde_json::Error>;
}

/// serde_json backed serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_json<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        serde_json::to_string(value)
    }

    fn from_json<T: DeserializeOwned>(&self, json: &str) -> Result<T, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: i64,
        text: String,
    }

    #[test]
    fn test_json_serializer() {
        let serializer = JsonSerializer;
        let json = serializer
            .to_json(&Note {
                id: 1,
                text: "hi".into(),
            })
            .unwrap();
        assert_eq!(json, r#"{"id":1,"text":"hi"}"#);

        let note: Note = serializer.from_json(&json).unwrap();
        assert_eq!(note.text, "hi");
        assert!(serializer.from_json::<Note>("{").is_err());
    }
}
