//! Topic Guard - Keyword classification and recommendation filtering
//!
//! The guard keeps model output on basketball. It classifies text by plain
//! keyword containment and replaces off-topic recommendations with a fixed
//! redirect before they reach the conversation log.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

// ============ Static Vocabulary ============

/// Lowercase basketball terms used for substring classification.
pub const BASKETBALL_KEYWORDS: &[&str] = &[
    "basketball",
    "nba",
    "wnba",
    "ncaa",
    "player",
    "team",
    "coach",
    "shooting",
    "defense",
    "offense",
    "dribble",
    "pass",
    "rebound",
    "assist",
    "block",
    "steal",
    "turnover",
    "court",
    "foul",
    "free throw",
    "jump shot",
    "layup",
    "dunk",
    "three-pointer",
    "pick and roll",
    "fast break",
    "zone defense",
    "man-to-man",
    "basketball analytics",
    "player efficiency",
    "true shooting",
    "effective field goal",
    "usage rate",
    "defensive rating",
    "offensive rating",
    "plus-minus",
    "box plus-minus",
    "win shares",
    "vorp",
    "per",
    "pace",
    "possession",
    "basketball strategy",
    "basketball statistics",
    "basketball metrics",
];

/// Ordered patterns that mark text as phrased like a recommendation.
pub const RECOMMENDATION_PATTERNS: &[(&str, &str)] = &[
    ("recommend", r"recommend(?:ed|ation|ations)?"),
    ("suggest", r"suggest(?:ed|ion|ions)?"),
    ("advice", r"advice"),
    ("you_should_try", r"you (?:could|should|might) try"),
    ("consider", r"consider"),
];

/// Substituted for an off-topic recommendation.
pub const REDIRECT_MESSAGE: &str = "I'd like to focus our conversation on basketball. \
For basketball-related recommendations, I suggest exploring topics like \
player development metrics, advanced statistical analysis, or team strategy optimization. \
What specific aspect of basketball would you like recommendations on?";

// ============ Policy Configuration ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPolicy {
    pub name: String,
    pub keywords: Vec<String>,
    pub recommendation_patterns: Vec<RecommendationPattern>,
    pub redirect_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationPattern {
    pub name: String,
    pub regex: String,
}

impl Default for TopicPolicy {
    fn default() -> Self {
        Self::basketball_default()
    }
}

impl TopicPolicy {
    /// Built-in basketball policy
    pub fn basketball_default() -> Self {
        Self {
            name: "Basketball Default Policy".to_string(),
            keywords: BASKETBALL_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            recommendation_patterns: RECOMMENDATION_PATTERNS
                .iter()
                .map(|(name, regex)| RecommendationPattern {
                    name: name.to_string(),
                    regex: regex.to_string(),
                })
                .collect(),
            redirect_message: REDIRECT_MESSAGE.to_string(),
        }
    }

    /// Load a policy from a JSON file
    pub fn load(path: &Path) -> Result<Self, GuardError> {
        let raw = fs::read_to_string(path)?;
        let policy: TopicPolicy =
            serde_json::from_str(&raw).map_err(|e| GuardError::PolicyParseError(e.to_string()))?;
        if policy.keywords.is_empty() {
            return Err(GuardError::PolicyParseError(
                "policy must list at least one keyword".to_string(),
            ));
        }
        Ok(policy)
    }
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Invalid recommendation pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("Policy parse error: {0}")]
    PolicyParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ============ Classifier ============

/// Substring keyword classifier.
///
/// No tokenization and no word boundaries: `per` matches inside `person`.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    keywords: Vec<String>,
}

impl TopicClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn basketball() -> Self {
        Self::new(BASKETBALL_KEYWORDS)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_related(&self, text: &str) -> bool {
        self.matched_keyword(text).is_some()
    }

    /// First keyword, in list order, contained in `text`
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let text_lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| text_lower.contains(k.as_str()))
            .map(String::as_str)
    }
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::basketball()
    }
}

// ============ Recommendation Detection ============

/// Decides whether text reads like a recommendation.
pub trait RecommendationDetector {
    /// Name of the first rule that fired, if any
    fn matched_pattern(&self, text: &str) -> Option<&str>;

    fn is_recommendation(&self, text: &str) -> bool {
        self.matched_pattern(text).is_some()
    }
}

impl<F> RecommendationDetector for F
where
    F: Fn(&str) -> bool,
{
    fn matched_pattern(&self, text: &str) -> Option<&str> {
        if self(text) {
            Some("predicate")
        } else {
            None
        }
    }
}

/// Regex detector, tested in order against the lowercased text.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<(String, Regex)>,
}

impl PatternDetector {
    pub fn compile(patterns: &[RecommendationPattern]) -> Result<Self, GuardError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&p.regex)
                    .map(|re| (p.name.clone(), re))
                    .map_err(|source| GuardError::InvalidPattern {
                        name: p.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn basketball_default() -> Result<Self, GuardError> {
        Self::compile(&TopicPolicy::basketball_default().recommendation_patterns)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl RecommendationDetector for PatternDetector {
    fn matched_pattern(&self, text: &str) -> Option<&str> {
        let text_lower = text.to_lowercase();
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(&text_lower))
            .map(|(name, _)| name.as_str())
    }
}

// ============ Filter ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Not a recommendation
    Passed,
    /// A recommendation that is already about basketball
    OnTopic { pattern: String },
    /// An off-topic recommendation, replaced by the redirect
    Redirected { pattern: String },
}

impl FilterOutcome {
    pub fn is_redirected(&self) -> bool {
        matches!(self, FilterOutcome::Redirected { .. })
    }
}

pub struct RecommendationFilter<D = PatternDetector> {
    detector: D,
    classifier: TopicClassifier,
    redirect_message: String,
}

impl RecommendationFilter<PatternDetector> {
    pub fn from_policy(policy: &TopicPolicy) -> Result<Self, GuardError> {
        Ok(Self {
            detector: PatternDetector::compile(&policy.recommendation_patterns)?,
            classifier: TopicClassifier::new(&policy.keywords),
            redirect_message: policy.redirect_message.clone(),
        })
    }
}

impl<D: RecommendationDetector> RecommendationFilter<D> {
    pub fn with_detector(
        detector: D,
        classifier: TopicClassifier,
        redirect_message: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            classifier,
            redirect_message: redirect_message.into(),
        }
    }

    pub fn classifier(&self) -> &TopicClassifier {
        &self.classifier
    }

    pub fn redirect_message(&self) -> &str {
        &self.redirect_message
    }

    /// Decide what happens to `text` without rewriting it
    pub fn apply(&self, text: &str) -> FilterOutcome {
        let Some(pattern) = self.detector.matched_pattern(text) else {
            return FilterOutcome::Passed;
        };

        // Whole-text classification: a mixed response with any keyword is kept.
        match self.classifier.matched_keyword(text) {
            Some(keyword) => {
                debug!(pattern, keyword, "recommendation is on topic");
                FilterOutcome::OnTopic {
                    pattern: pattern.to_string(),
                }
            }
            None => {
                debug!(pattern, "redirecting off-topic recommendation");
                FilterOutcome::Redirected {
                    pattern: pattern.to_string(),
                }
            }
        }
    }

    /// Filter owned text, returning the text to display and what happened
    pub fn screen(&self, text: String) -> (String, FilterOutcome) {
        let outcome = self.apply(&text);
        if outcome.is_redirected() {
            (self.redirect_message.clone(), outcome)
        } else {
            (text, outcome)
        }
    }

    pub fn filter(&self, text: &str) -> String {
        self.screen(text.to_string()).0
    }
}

// ============ Default Entry Points ============

fn default_classifier() -> &'static TopicClassifier {
    static CLASSIFIER: OnceLock<TopicClassifier> = OnceLock::new();
    CLASSIFIER.get_or_init(TopicClassifier::basketball)
}

fn default_filter() -> &'static RecommendationFilter<PatternDetector> {
    static FILTER: OnceLock<RecommendationFilter<PatternDetector>> = OnceLock::new();
    FILTER.get_or_init(|| {
        // The built-in patterns are constants; compiling them cannot fail.
        let detector = PatternDetector::basketball_default()
            .unwrap_or_else(|e| panic!("built-in recommendation patterns: {e}"));
        RecommendationFilter::with_detector(
            detector,
            default_classifier().clone(),
            REDIRECT_MESSAGE,
        )
    })
}

/// True iff any basketball keyword occurs in `text`, ignoring case
pub fn is_basketball_related(text: &str) -> bool {
    default_classifier().is_related(text)
}

/// Replace an off-topic recommendation with the basketball redirect
pub fn filter_recommendation(text: &str) -> String {
    default_filter().filter(text)
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_is_case_insensitive() {
        assert!(is_basketball_related("BASKETBALL"));
        assert_eq!(
            is_basketball_related("BASKETBALL"),
            is_basketball_related("basketball")
        );
        assert!(is_basketball_related("Who won the NBA finals?"));
    }

    #[test]
    fn test_inserting_rebound_makes_text_related() {
        let texts = ["The weather is nice today", "", "I like cooking soup", "xyz"];
        for text in texts {
            assert!(!is_basketball_related(text), "{text:?} should be unrelated");
            for at in [0, text.len() / 2, text.len()] {
                let mut edited = text.to_string();
                edited.insert_str(at, "rebound");
                assert!(is_basketball_related(&edited), "{edited:?} should be related");
            }
        }
    }

    #[test]
    fn test_substring_false_positive_is_accepted() {
        // "per" sits inside "person"
        assert!(is_basketball_related("a person walked by"));
        assert_eq!(
            TopicClassifier::basketball().matched_keyword("a person walked by"),
            Some("per")
        );
    }

    #[test]
    fn test_matched_keyword_follows_list_order() {
        let classifier = TopicClassifier::new(["Dunk", "layup"]);
        assert_eq!(classifier.keywords(), &["dunk".to_string(), "layup".to_string()]);
        assert_eq!(classifier.matched_keyword("layup then DUNK"), Some("dunk"));
    }

    #[test]
    fn test_filter_redirects_off_topic_suggestion() {
        assert_eq!(
            filter_recommendation("I suggest eating vegetables"),
            REDIRECT_MESSAGE
        );
    }

    #[test]
    fn test_filter_keeps_basketball_recommendation() {
        let text = "I recommend working on your three-pointer";
        assert_eq!(filter_recommendation(text), text);
    }

    #[test]
    fn test_filter_keeps_non_recommendation() {
        let text = "The weather is nice today";
        assert_eq!(filter_recommendation(text), text);
    }

    #[test]
    fn test_redirect_is_stable_under_refiltering() {
        assert!(is_basketball_related(REDIRECT_MESSAGE));
        assert_eq!(filter_recommendation(REDIRECT_MESSAGE), REDIRECT_MESSAGE);
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let detector = PatternDetector::basketball_default().unwrap();
        assert_eq!(detector.len(), 5);
        assert_eq!(
            detector.matched_pattern("You should try to CONSIDER my ADVICE"),
            Some("advice")
        );
        assert_eq!(
            detector.matched_pattern("My suggestion: recommendations"),
            Some("recommend")
        );
        assert_eq!(detector.matched_pattern("you might try yoga"), Some("you_should_try"));
        assert_eq!(detector.matched_pattern("nothing here"), None);
    }

    #[test]
    fn test_apply_reports_outcome() {
        let filter = RecommendationFilter::from_policy(&TopicPolicy::basketball_default()).unwrap();
        assert_eq!(filter.apply("Nice day"), FilterOutcome::Passed);
        assert_eq!(
            filter.apply("Consider a better zone defense"),
            FilterOutcome::OnTopic {
                pattern: "consider".to_string()
            }
        );
        let (text, outcome) = filter.screen("My advice: buy bonds".to_string());
        assert!(outcome.is_redirected());
        assert_eq!(text, REDIRECT_MESSAGE);
    }

    #[test]
    fn test_custom_predicate_detector() {
        let filter = RecommendationFilter::with_detector(
            |text: &str| text.ends_with('!'),
            TopicClassifier::new(["hoops"]),
            "Back to hoops.",
        );
        assert_eq!(filter.filter("Buy this!"), "Back to hoops.");
        assert_eq!(filter.filter("Play hoops!"), "Play hoops!");
        assert_eq!(filter.filter("I recommend bonds"), "I recommend bonds");
        assert_eq!(
            filter.apply("Buy this!"),
            FilterOutcome::Redirected {
                pattern: "predicate".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_pattern_is_rejected_at_compile() {
        let result = PatternDetector::compile(&[RecommendationPattern {
            name: "broken".to_string(),
            regex: "(unclosed".to_string(),
        }]);
        match result {
            Err(GuardError::InvalidPattern { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_json_round_trip() {
        let policy = TopicPolicy::basketball_default();
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: TopicPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.keywords.len(), BASKETBALL_KEYWORDS.len());
        assert_eq!(parsed.recommendation_patterns.len(), RECOMMENDATION_PATTERNS.len());
        assert_eq!(parsed.redirect_message, REDIRECT_MESSAGE);
    }

    #[test]
    fn test_load_rejects_empty_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let mut policy = TopicPolicy::basketball_default();
        policy.keywords.clear();
        fs::write(&path, serde_json::to_string(&policy).unwrap()).unwrap();

        assert!(matches!(
            TopicPolicy::load(&path),
            Err(GuardError::PolicyParseError(_))
        ));
    }

    #[test]
    fn test_loaded_policy_drives_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let policy = TopicPolicy {
            name: "Hockey".to_string(),
            keywords: vec!["puck".to_string(), "icing".to_string()],
            recommendation_patterns: vec![RecommendationPattern {
                name: "suggest".to_string(),
                regex: "suggest".to_string(),
            }],
            redirect_message: "Let's talk hockey.".to_string(),
        };
        fs::write(&path, serde_json::to_string(&policy).unwrap()).unwrap();

        let loaded = TopicPolicy::load(&path).unwrap();
        let filter = RecommendationFilter::from_policy(&loaded).unwrap();

        assert!(filter.classifier().is_related("Who controls the PUCK?"));
        assert!(!filter.classifier().is_related("basketball"));
        assert_eq!(filter.redirect_message(), "Let's talk hockey.");
        assert_eq!(filter.filter("I suggest a nap"), "Let's talk hockey.");
        assert_eq!(
            filter.filter("I suggest a better icing call"),
            "I suggest a better icing call"
        );
    }
}
