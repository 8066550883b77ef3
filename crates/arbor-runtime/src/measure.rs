#![forbid(unsafe_code)]

//! Content measurement collaborator.
//!
//! Topics do not know what they display. When a topic's text, image or
//! icon changes, the host asks a [`ContentMeasurer`] for the content's
//! natural size and hands it to [`MindMap::content_changed`], which records
//! a resize only when the size actually differs.
//!
//! [`MindMap::content_changed`]: crate::MindMap::content_changed

use arbor_core::geometry::Size;
use arbor_layout::TopicId;

/// Reports the natural size of a topic's rendered content.
pub trait ContentMeasurer {
    /// Natural size of `id`'s content, or `None` if the measurer does not
    /// know the topic.
    fn natural_size(&self, id: TopicId) -> Option<Size>;
}

impl<F> ContentMeasurer for F
where
    F: Fn(TopicId) -> Option<Size>,
{
    fn natural_size(&self, id: TopicId) -> Option<Size> {
        self(id)
    }
}

/// Measurer that reports one size for every topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedMeasurer(pub Size);

impl ContentMeasurer for FixedMeasurer {
    fn natural_size(&self, _id: TopicId) -> Option<Size> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_measure() {
        let known = TopicId::from_raw(1);
        let measurer = move |id: TopicId| (id == known).then(|| Size::new(80.0, 24.0));
        assert_eq!(measurer.natural_size(known), Some(Size::new(80.0, 24.0)));
        assert_eq!(measurer.natural_size(TopicId::from_raw(2)), None);
    }

    #[test]
    fn fixed_measurer_ignores_the_id() {
        let measurer = FixedMeasurer(Size::new(10.0, 5.0));
        let dyn_measurer: &dyn ContentMeasurer = &measurer;
        assert_eq!(
            dyn_measurer.natural_size(TopicId::from_raw(7)),
            Some(Size::new(10.0, 5.0))
        );
    }
}
