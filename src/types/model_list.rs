use serde::{Deserialize, Serialize};

/// A model served by the inference server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The served model name, used as `model` in requests.
    pub id: String,

    /// Owner reported by the server; vLLM reports `"vllm"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

/// Response body of `GET /v1/models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    /// Served models.
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    /// The ids of all served models, in server order.
    pub fn ids(&self) -> Vec<String> {
        self.data.iter().map(|model| model.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_list_deserialization() {
        let list: ModelList = serde_json::from_value(json!({
            "object": "list",
            "data": [
                {"id": "Medical_Qwen3_8B_Large_Language_Model", "object": "model", "owned_by": "vllm"},
                {"id": "Qwen3-4B", "object": "model"}
            ]
        }))
        .unwrap();
        assert_eq!(
            list.ids(),
            vec![
                "Medical_Qwen3_8B_Large_Language_Model".to_string(),
                "Qwen3-4B".to_string()
            ]
        );
        assert_eq!(list.data[0].owned_by.as_deref(), Some("vllm"));
    }
}
