//! Requests travelling down a transformer chain.

/// A segment path and the transformers still to apply.
///
/// The serving hop is the last entry. Each hop derives the request for the
/// next one with [`TransformRequest::pop`]; the original is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub video_path: String,
    pub transformers: Vec<String>,
}

impl TransformRequest {
    pub fn new(video_path: impl Into<String>, transformers: Vec<String>) -> Self {
        Self {
            video_path: video_path.into(),
            transformers,
        }
    }

    /// Split off the tail entry, returning it with the request for the next hop.
    pub fn pop(&self) -> Option<(&str, TransformRequest)> {
        let (last, rest) = self.transformers.split_last()?;
        Some((
            last.as_str(),
            TransformRequest {
                video_path: self.video_path.clone(),
                transformers: rest.to_vec(),
            },
        ))
    }

    /// The next hop to call, if any.
    pub fn next_hop(&self) -> Option<&str> {
        self.transformers.last().map(String::as_str)
    }

    /// No transformers left: the hop holding this request reads from storage.
    pub fn is_origin(&self) -> bool {
        self.transformers.is_empty()
    }
}
