//! Classificador de Sinais
//!
//! O pipeline só conhece a capacidade [`SignalClassifier`]. O backend
//! concreto ([`LinearSignalModel`]) é carregado uma vez na inicialização e
//! nunca é alterado depois.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ModelError;
use crate::features::{FeatureVector, FEATURE_NAMES, NUM_FEATURES};
use crate::types::Signal;

/// Número de classes do modelo (SELL, HOLD, BUY).
pub const NUM_CLASSES: usize = 3;

/// Função pura de vetor de features para sinal.
pub trait SignalClassifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Signal;
}

impl<F> SignalClassifier for F
where
    F: Fn(&FeatureVector) -> Signal + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> Signal {
        self(features)
    }
}

/// Formato do arquivo de modelo (JSON).
#[derive(Debug, Deserialize)]
struct ModelFile {
    feature_names: Vec<String>,
    #[serde(default)]
    mean: Option<Vec<f64>>,
    #[serde(default)]
    scale: Option<Vec<f64>>,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

/// Modelo linear multinomial: `score[k] = w[k]·x' + b[k]`, com
/// `x' = (x - mean) / scale` quando a padronização está presente.
#[derive(Debug, Clone)]
pub struct LinearSignalModel {
    mean: [f64; NUM_FEATURES],
    scale: [f64; NUM_FEATURES],
    weights: [[f64; NUM_FEATURES]; NUM_CLASSES],
    intercepts: [f64; NUM_CLASSES],
}

impl LinearSignalModel {
    /// Carrega o modelo de um arquivo JSON.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json(&text).map_err(|e| match e {
            ModelError::Json { source, .. } => ModelError::Json {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(path = %path.display(), "modelo carregado");
        Ok(model)
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(text).map_err(|source| ModelError::Json {
            path: Default::default(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: ModelFile) -> Result<Self, ModelError> {
        if file.feature_names.len() != NUM_FEATURES
            || file.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ModelError::SchemaMismatch {
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                found: file.feature_names,
            });
        }

        let mean = match file.mean {
            Some(v) => to_array("mean", &v)?,
            None => [0.0; NUM_FEATURES],
        };
        let scale = match file.scale {
            Some(v) => to_array("scale", &v)?,
            None => [1.0; NUM_FEATURES],
        };
        if scale.iter().any(|s| *s == 0.0) {
            return Err(ModelError::NonFinite("scale"));
        }

        if file.weights.len() != NUM_CLASSES {
            return Err(ModelError::Shape {
                field: "weights",
                expected: NUM_CLASSES,
                found: file.weights.len(),
            });
        }
        let mut weights = [[0.0; NUM_FEATURES]; NUM_CLASSES];
        for (row, values) in weights.iter_mut().zip(&file.weights) {
            *row = to_array("weights", values)?;
        }

        if file.intercepts.len() != NUM_CLASSES {
            return Err(ModelError::Shape {
                field: "intercepts",
                expected: NUM_CLASSES,
                found: file.intercepts.len(),
            });
        }
        let mut intercepts = [0.0; NUM_CLASSES];
        intercepts.copy_from_slice(&file.intercepts);
        if intercepts.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("intercepts"));
        }

        Ok(Self {
            mean,
            scale,
            weights,
            intercepts,
        })
    }

    /// Scores brutos por classe (índices 0/1/2).
    pub fn scores(&self, features: &FeatureVector) -> [f64; NUM_CLASSES] {
        let mut x = [0.0; NUM_FEATURES];
        for (i, v) in features.values().iter().enumerate() {
            x[i] = (v - self.mean[i]) / self.scale[i];
        }
        let mut scores = self.intercepts;
        for (score, row) in scores.iter_mut().zip(&self.weights) {
            *score += row.iter().zip(&x).map(|(w, xi)| w * xi).sum::<f64>();
        }
        scores
    }
}

impl SignalClassifier for LinearSignalModel {
    fn predict(&self, features: &FeatureVector) -> Signal {
        let scores = self.scores(features);
        // Empate: vence o menor índice.
        let mut best = 0;
        for k in 1..NUM_CLASSES {
            if scores[k] > scores[best] {
                best = k;
            }
        }
        Signal::from_class_index(best).unwrap_or(Signal::Hold)
    }
}

fn to_array(field: &'static str, values: &[f64]) -> Result<[f64; NUM_FEATURES], ModelError> {
    if values.len() != NUM_FEATURES {
        return Err(ModelError::Shape {
            field,
            expected: NUM_FEATURES,
            found: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite(field));
    }
    let mut out = [0.0; NUM_FEATURES];
    out.copy_from_slice(values);
    Ok(out)
}
