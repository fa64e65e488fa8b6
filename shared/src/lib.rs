use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClassificationResponse {
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}
