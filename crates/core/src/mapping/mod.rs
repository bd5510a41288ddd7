use serde::{Deserialize, Serialize};

use crate::{uniform::UniformValue, FeatureFrame};

/// Describes how a feature should be routed to a uniform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub source: String,
    pub target: String,
    #[serde(default = "unit_gain")]
    pub gain: f32,
}

fn unit_gain() -> f32 {
    1.0
}

impl MappingDescriptor {
    pub fn new(source: impl Into<String>, target: impl Into<String>, gain: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            gain,
        }
    }
}

/// Routes every analysed frame through a fixed list of descriptors.
#[derive(Debug, Default, Clone)]
pub struct MappingMatrix {
    descriptors: Vec<MappingDescriptor>,
}

impl MappingMatrix {
    pub fn new(descriptors: Vec<MappingDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The routing the live demo ships with.
    pub fn live_defaults() -> Self {
        Self::new(default_descriptors())
    }

    pub fn descriptors(&self) -> &[MappingDescriptor] {
        &self.descriptors
    }

    /// Uniform names this matrix writes. Each one is a natural coalescing
    /// category since only its latest value matters.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|descriptor| descriptor.target.as_str())
    }

    pub fn evaluate(&self, frame: &FeatureFrame) -> Vec<ParameterUpdate> {
        self.descriptors
            .iter()
            .filter_map(|descriptor| {
                let Some(value) = frame.feature(&descriptor.source) else {
                    tracing::debug!(source = %descriptor.source, "unknown feature in mapping");
                    return None;
                };
                Some(ParameterUpdate {
                    target: descriptor.target.clone(),
                    value: UniformValue::Float(value).scaled(descriptor.gain),
                })
            })
            .collect()
    }
}

pub(crate) fn default_descriptors() -> Vec<MappingDescriptor> {
    vec![
        MappingDescriptor::new("rms", "intensity", 1.0),
        MappingDescriptor::new("spectral_centroid", "motion", 1.0),
        MappingDescriptor::new("onset", "beat", 1.0),
        MappingDescriptor::new("low_band_energy", "bass", 1.0),
        MappingDescriptor::new("high_band_energy", "treble", 1.0),
    ]
}

/// Concrete value routed to a uniform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub target: String,
    pub value: UniformValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_gain_per_descriptor() {
        let matrix = MappingMatrix::new(vec![
            MappingDescriptor::new("rms", "intensity", 2.0),
            MappingDescriptor::new("onset", "beat", 0.5),
        ]);
        let frame = FeatureFrame {
            rms: 0.25,
            onset: 1.0,
            ..Default::default()
        };

        let updates = matrix.evaluate(&frame);
        assert_eq!(
            updates,
            vec![
                ParameterUpdate { target: "intensity".into(), value: UniformValue::Float(0.5) },
                ParameterUpdate { target: "beat".into(), value: UniformValue::Float(0.5) },
            ]
        );
    }

    #[test]
    fn skips_unknown_sources() {
        let matrix = MappingMatrix::new(vec![MappingDescriptor::new("tempo", "speed", 1.0)]);
        assert!(matrix.evaluate(&FeatureFrame::default()).is_empty());
    }

    #[test]
    fn gain_defaults_to_one_when_omitted() {
        let descriptor: MappingDescriptor =
            serde_json::from_str(r#"{ "source": "rms", "target": "intensity" }"#).unwrap();
        assert_eq!(descriptor.gain, 1.0);
    }

    #[test]
    fn defaults_cover_every_feature() {
        let matrix = MappingMatrix::live_defaults();
        let frame = FeatureFrame::default();
        assert_eq!(matrix.evaluate(&frame).len(), matrix.descriptors().len());
        assert!(matrix.targets().any(|target| target == "bass"));
    }
}
