//! Disambiguation selector

use evp_common::{Attendee, AttendeeId, ValidationError};
use std::mem;

/// Holds the candidate list while the attendee picks one
///
/// The list is cleared as soon as a choice is made, so it cannot be chosen
/// from twice.
#[derive(Debug, Default)]
pub struct DisambiguationSelector {
    candidates: Vec<Attendee>,
}

impl DisambiguationSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a list, in resolver order
    pub fn present(&mut self, candidates: Vec<Attendee>) {
        self.candidates = candidates;
    }

    pub fn candidates(&self) -> &[Attendee] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Take the candidate at `index` (0-based), clearing the list
    ///
    /// An out-of-range index leaves the list untouched.
    pub fn take(&mut self, index: usize) -> Result<Attendee, ValidationError> {
        if index >= self.candidates.len() {
            return Err(ValidationError::NoSuchCandidate(format!("#{}", index + 1)));
        }
        let mut list = mem::take(&mut self.candidates);
        Ok(list.swap_remove(index))
    }

    /// Take the candidate with `id`, clearing the list
    pub fn take_by_id(&mut self, id: &AttendeeId) -> Result<Attendee, ValidationError> {
        match self.candidates.iter().position(|a| &a.id == id) {
            Some(index) => self.take(index),
            None => Err(ValidationError::NoSuchCandidate(id.to_string())),
        }
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> Vec<Attendee> {
        ["a", "b", "c"]
            .iter()
            .map(|id| Attendee::new(*id, format!("NAME {}", id), "9876543210"))
            .collect()
    }

    #[test]
    fn test_take_clears_list() {
        let mut selector = DisambiguationSelector::new();
        selector.present(three());
        assert_eq!(selector.len(), 3);

        let chosen = selector.take(1).unwrap();
        assert_eq!(chosen.id.as_str(), "b");
        assert!(selector.is_empty());
        assert!(selector.take(0).is_err());
    }

    #[test]
    fn test_take_by_id() {
        let mut selector = DisambiguationSelector::new();
        selector.present(three());
        let chosen = selector.take_by_id(&AttendeeId::new("c")).unwrap();
        assert_eq!(chosen.id.as_str(), "c");
        assert!(selector.is_empty());
    }

    #[test]
    fn test_bad_choice_keeps_list() {
        let mut selector = DisambiguationSelector::new();
        selector.present(three());
        assert_eq!(
            selector.take(3).unwrap_err(),
            ValidationError::NoSuchCandidate("#4".into())
        );
        assert!(selector.take_by_id(&AttendeeId::new("zz")).is_err());
        assert_eq!(selector.len(), 3);
    }
}
