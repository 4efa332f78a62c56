// SPDX-License-Identifier: GPL-3.0-or-later
use sitesub_domain::{CandidateResource, RecognizedMedia};

use crate::collaborators::{CollaboratorError, RuleGroupEvaluator};

/// Delegates selection among candidates to the host's named priority rules.
#[derive(Debug, Clone, Default)]
pub struct RuleGroupFilter {
    groups: Vec<String>,
}

impl RuleGroupFilter {
    pub fn new(groups: Vec<String>) -> Self {
        let groups = groups
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        Self { groups }
    }

    pub fn is_active(&self) -> bool {
        !self.groups.is_empty()
    }

    /// `Ok(None)` when the rules reject the candidate. With no groups the
    /// candidate passes through untouched.
    pub async fn select(
        &self,
        evaluator: &dyn RuleGroupEvaluator,
        candidate: CandidateResource,
        media: &RecognizedMedia,
    ) -> Result<Option<CandidateResource>, CollaboratorError> {
        if !self.is_active() {
            return Ok(Some(candidate));
        }

        let selected = evaluator
            .evaluate(&self.groups, std::slice::from_ref(&candidate), media)
            .await?;
        Ok(selected.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitesub_domain::MediaType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Evaluator {
        result: Vec<CandidateResource>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RuleGroupEvaluator for Evaluator {
        async fn evaluate(
            &self,
            groups: &[String],
            candidates: &[CandidateResource],
            _media: &RecognizedMedia,
        ) -> Result<Vec<CandidateResource>, CollaboratorError> {
            assert_eq!(groups, ["hq"]);
            assert_eq!(candidates.len(), 1);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn media() -> RecognizedMedia {
        RecognizedMedia::new("Show", MediaType::Series, 1)
    }

    #[tokio::test]
    async fn no_groups_passes_through_without_calling_host() {
        let evaluator = Evaluator {
            result: vec![],
            calls: AtomicUsize::new(0),
        };
        let filter = RuleGroupFilter::new(vec![" ".to_string()]);
        let candidate = CandidateResource::new("1", "Show.S01E01");

        let selected = filter
            .select(&evaluator, candidate.clone(), &media())
            .await
            .unwrap();
        assert_eq!(selected, Some(candidate));
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn returned_candidate_replaces_original() {
        let mut replacement = CandidateResource::new("1", "Show.S01E01.2160p");
        replacement.enclosure = Some("https://site/dl/2".to_string());
        let evaluator = Evaluator {
            result: vec![replacement.clone()],
            calls: AtomicUsize::new(0),
        };
        let filter = RuleGroupFilter::new(vec!["hq".to_string()]);

        let selected = filter
            .select(&evaluator, CandidateResource::new("1", "Show.S01E01"), &media())
            .await
            .unwrap();
        assert_eq!(selected, Some(replacement));
    }

    #[tokio::test]
    async fn empty_result_rejects() {
        let evaluator = Evaluator {
            result: vec![],
            calls: AtomicUsize::new(0),
        };
        let filter = RuleGroupFilter::new(vec!["hq".to_string()]);

        let selected = filter
            .select(&evaluator, CandidateResource::new("1", "Show.S01E01"), &media())
            .await
            .unwrap();
        assert_eq!(selected, None);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
    }
}
