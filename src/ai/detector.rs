//! Client for the face/object/scene detection containers.
//!
//! Speaks the DeepStack-style JSON API (`/v1/vision/face/recognize`,
//! `/v1/vision/detection`, `/v1/vision/scene`): a base64 image in, a
//! `success` flag plus predictions out. The `min_confidence` threshold is
//! sent to the service and applied again client-side since not every
//! backend honors it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{request_error, ServiceError};
use crate::config::DetectorConfig;
use crate::sidecar::{DetectedObject, ObjectsSidecar, PeopleSidecar, RecognizedFace, SceneSidecar};

pub struct DetectorClient {
    endpoint: String,
    min_confidence: f64,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct VisionRequest {
    image: String,
    min_confidence: f64,
}

#[derive(Debug, Deserialize)]
struct FaceResponse {
    success: bool,
    #[serde(default)]
    predictions: Vec<FacePrediction>,
}

#[derive(Debug, Deserialize)]
struct FacePrediction {
    userid: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    success: bool,
    #[serde(default)]
    predictions: Vec<ObjectPrediction>,
}

#[derive(Debug, Deserialize)]
struct ObjectPrediction {
    label: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct SceneResponse {
    success: bool,
    #[serde(default)]
    label: String,
    #[serde(default)]
    confidence: Option<f64>,
}

impl DetectorClient {
    pub fn from_config(config: &DetectorConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(60))
            .build();
        Self {
            endpoint: config.endpoint.clone(),
            min_confidence: config.min_confidence,
            agent,
        }
    }

    pub fn recognize_faces(&self, image_path: &Path) -> Result<PeopleSidecar, ServiceError> {
        let response: FaceResponse = self.post_vision("v1/vision/face/recognize", image_path)?;
        if !response.success {
            return Err(ServiceError::BadPayload(
                "face service reported failure".to_string(),
            ));
        }
        let faces: Vec<RecognizedFace> = response
            .predictions
            .into_iter()
            .filter(|p| p.confidence >= self.min_confidence)
            .map(|p| RecognizedFace {
                name: p.userid,
                confidence: p.confidence,
            })
            .collect();
        Ok(PeopleSidecar {
            count: faces.len(),
            faces,
        })
    }

    pub fn detect_objects(&self, image_path: &Path) -> Result<ObjectsSidecar, ServiceError> {
        let response: DetectionResponse = self.post_vision("v1/vision/detection", image_path)?;
        if !response.success {
            return Err(ServiceError::BadPayload(
                "detection service reported failure".to_string(),
            ));
        }
        let objects: Vec<DetectedObject> = response
            .predictions
            .into_iter()
            .filter(|p| p.confidence >= self.min_confidence)
            .map(|p| DetectedObject {
                label: p.label,
                confidence: p.confidence,
            })
            .collect();
        Ok(ObjectsSidecar {
            count: objects.len(),
            objects,
        })
    }

    pub fn classify_scene(&self, image_path: &Path) -> Result<SceneSidecar, ServiceError> {
        let response: SceneResponse = self.post_vision("v1/vision/scene", image_path)?;
        if !response.success {
            return Err(ServiceError::BadPayload(
                "scene service reported failure".to_string(),
            ));
        }
        Ok(SceneSidecar {
            scene: response.label,
            confidence: response.confidence,
        })
    }

    fn post_vision<T: serde::de::DeserializeOwned>(
        &self,
        route: &str,
        image_path: &Path,
    ) -> Result<T, ServiceError> {
        let bytes = std::fs::read(image_path).map_err(|e| ServiceError::BadImage {
            path: image_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let request = VisionRequest {
            image: BASE64.encode(bytes),
            min_confidence: self.min_confidence,
        };

        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), route);
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| request_error(&self.endpoint, e))?;

        response
            .into_json()
            .map_err(|e| ServiceError::BadPayload(e.to_string()))
    }
}
