//! Purpose: Point prompts that steer mask decoding.
//! Exports: `Prompt`, `PointLabel`.
//! Role: Parse and validate user-supplied prompt JSON before any expensive work.
//! Invariants: `points.len() == labels.len()`, both non-empty, coordinates finite.
//! Invariants: Label > 0 is foreground, label <= 0 is background (1/0 canonical).
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

const PROMPT_HINT: &str =
    r#"Use e.g. --prompt '{"points": [[120, 80]], "point_labels": [1]}' (1 = foreground, 0 = background)."#;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointLabel {
    Foreground,
    Background,
}

impl PointLabel {
    pub fn from_raw(raw: i64) -> Self {
        if raw > 0 {
            PointLabel::Foreground
        } else {
            PointLabel::Background
        }
    }

    pub fn is_foreground(self) -> bool {
        matches!(self, PointLabel::Foreground)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    points: Vec<[f64; 2]>,
    labels: Vec<PointLabel>,
}

impl Prompt {
    pub fn new(points: Vec<[f64; 2]>, point_labels: Vec<i64>) -> Result<Self, Error> {
        if points.len() != point_labels.len() {
            return Err(validation_error(format!(
                "length of 'points' ({}) and 'point_labels' ({}) must be the same",
                points.len(),
                point_labels.len()
            )));
        }
        if points.is_empty() {
            return Err(validation_error("'points' and 'point_labels' must not be empty"));
        }
        if let Some(idx) = points
            .iter()
            .position(|[x, y]| !x.is_finite() || !y.is_finite())
        {
            return Err(validation_error(format!(
                "point {idx} has a non-finite coordinate"
            )));
        }
        Ok(Self {
            points,
            labels: point_labels.into_iter().map(PointLabel::from_raw).collect(),
        })
    }

    /// Parses `{"points": [[x, y], ...], "point_labels": [l, ...]}`.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(raw).map_err(|err| {
            validation_error("prompt is not valid json").with_source(err)
        })?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, Error> {
        let Some(object) = value.as_object() else {
            return Err(validation_error("prompt must be a json object"));
        };
        let (Some(points), Some(labels)) = (object.get("points"), object.get("point_labels"))
        else {
            return Err(validation_error(
                "'points' and 'point_labels' must be specified in prompt",
            ));
        };
        let points = parse_points(points)?;
        let labels = parse_labels(labels)?;
        Self::new(points, labels)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn labels(&self) -> &[PointLabel] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = ([f64; 2], PointLabel)> + '_ {
        self.points.iter().copied().zip(self.labels.iter().copied())
    }

    pub fn foreground(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.iter()
            .filter(|(_, label)| label.is_foreground())
            .map(|(point, _)| point)
    }

    pub fn background(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.iter()
            .filter(|(_, label)| !label.is_foreground())
            .map(|(point, _)| point)
    }
}

fn parse_points(value: &Value) -> Result<Vec<[f64; 2]>, Error> {
    let Some(items) = value.as_array() else {
        return Err(validation_error("'points' must be an array of [x, y] pairs"));
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let pair = item.as_array().filter(|pair| pair.len() == 2);
            let coords = pair.and_then(|pair| Some([pair[0].as_f64()?, pair[1].as_f64()?]));
            coords.ok_or_else(|| {
                validation_error(format!("point {idx} must be a numeric [x, y] pair"))
            })
        })
        .collect()
}

fn parse_labels(value: &Value) -> Result<Vec<i64>, Error> {
    let Some(items) = value.as_array() else {
        return Err(validation_error("'point_labels' must be an array of integers"));
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            // Positive labels beyond i64 are still foreground.
            let label = item.as_i64().or_else(|| item.as_u64().map(|_| i64::MAX));
            label.ok_or_else(|| {
                validation_error(format!("point label {idx} must be an integer"))
            })
        })
        .collect()
}

fn validation_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Validation)
        .with_message(message)
        .with_hint(PROMPT_HINT)
}
