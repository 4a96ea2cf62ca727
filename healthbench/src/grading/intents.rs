//! Declarative criterion-intent table for the heuristic grader
//!
//! Each rubric criterion is classified once against [`INTENT_RULES`] by
//! scanning its text for trigger words. Each intent then says what evidence
//! in a response counts as satisfying it, per supported script.

use serde::{Deserialize, Serialize};

/// What a criterion is asking the response to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionIntent {
    DoctorReferral,
    TreatmentPlan,
    Urgency,
    Disclaimer,
    Monitoring,
    PossibleCauses,
    Structure,
    Helpfulness,
    /// The criterion describes something the response should *not* do
    Penalty,
}

/// Writing system a keyword family targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Han,
    Latin,
}

/// Response keywords for one script
#[derive(Debug, Clone, Copy)]
pub struct KeywordFamily {
    pub script: Script,
    pub keywords: &'static [&'static str],
}

impl KeywordFamily {
    /// Latin keywords are lowercase and match case-insensitively; Han
    /// keywords match the response as written.
    pub fn found_in(&self, response: &str, response_lower: &str) -> bool {
        let haystack = match self.script {
            Script::Han => response,
            Script::Latin => response_lower,
        };
        self.keywords.iter().any(|kw| haystack.contains(kw))
    }
}

/// What counts as evidence for an intent
#[derive(Debug, Clone, Copy)]
pub enum Evidence {
    /// Any keyword of any family appears in the response
    Keywords(&'static [KeywordFamily]),
    /// Response is longer than `min_chars` and shows a sentence or list marker
    Structured {
        min_chars: usize,
        markers: &'static [&'static str],
    },
    /// Response is longer than `min_chars`
    MinLength { min_chars: usize },
    /// Decided by the grader's penalty policy, not by response keywords
    PenaltyPolicy,
}

/// One row of the intent table
#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub intent: CriterionIntent,
    /// Lowercase words whose presence in the criterion text selects this intent
    pub triggers: &'static [&'static str],
    pub evidence: Evidence,
}

impl IntentRule {
    fn triggered_by(&self, criterion_lower: &str) -> bool {
        self.triggers.iter().any(|t| criterion_lower.contains(t))
    }

    /// Whether `response` shows evidence for this intent.
    ///
    /// `response_lower` must be the lowercased form of `response`.
    pub fn satisfied_by(&self, response: &str, response_lower: &str) -> bool {
        match self.evidence {
            Evidence::Keywords(families) => families
                .iter()
                .any(|family| family.found_in(response, response_lower)),
            Evidence::Structured { min_chars, markers } => {
                response.chars().count() > min_chars && markers.iter().any(|m| response.contains(m))
            }
            Evidence::MinLength { min_chars } => response.chars().count() > min_chars,
            Evidence::PenaltyPolicy => false,
        }
    }
}

pub static INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: CriterionIntent::Penalty,
        triggers: &["harmful", "dangerous", "not accurate", "inaccurate", "avoid"],
        evidence: Evidence::PenaltyPolicy,
    },
    IntentRule {
        intent: CriterionIntent::DoctorReferral,
        triggers: &["doctor", "physician", "medical", "healthcare"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["医生", "就医", "医院", "医疗", "建议"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &["doctor", "physician", "hospital", "clinic", "healthcare provider"],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::TreatmentPlan,
        triggers: &["therapy", "plan", "treatment", "intervention", "lifestyle"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["治疗", "建议", "计划", "方法", "方案"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &["treatment", "therapy", "medication", "plan", "try to"],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::Urgency,
        triggers: &["emergency", "urgent", "urgency", "immediate"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["立即", "马上", "急救", "急诊", "紧急"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &["immediately", "emergency", "urgent", "right away", "call 911"],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::Disclaimer,
        triggers: &["disclaimer", "not medical advice", "professional"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["仅供参考", "不能替代", "请咨询医生", "建议就医"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &[
                    "not a substitute",
                    "not medical advice",
                    "consult a",
                    "for reference only",
                ],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::Monitoring,
        triggers: &["monitor", "track", "improvement"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["观察", "监测", "持续", "改善"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &["monitor", "keep track", "watch for", "observe"],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::PossibleCauses,
        triggers: &["cause"],
        evidence: Evidence::Keywords(&[
            KeywordFamily {
                script: Script::Han,
                keywords: &["可能", "原因", "因为"],
            },
            KeywordFamily {
                script: Script::Latin,
                keywords: &["possible cause", "could be due", "may be caused", "because"],
            },
        ]),
    },
    IntentRule {
        intent: CriterionIntent::Structure,
        triggers: &["specific", "clear", "structured", "actionable", "instruction"],
        evidence: Evidence::Structured {
            min_chars: 50,
            markers: &["。", "1.", "•", "\n- "],
        },
    },
    IntentRule {
        intent: CriterionIntent::Helpfulness,
        triggers: &["helpful"],
        evidence: Evidence::MinLength { min_chars: 50 },
    },
];

/// Classify a criterion's text into the intents it triggers, in table order
pub fn classify(criterion_text: &str) -> Vec<CriterionIntent> {
    let lower = criterion_text.to_lowercase();
    INTENT_RULES
        .iter()
        .filter(|rule| rule.triggered_by(&lower))
        .map(|rule| rule.intent)
        .collect()
}

/// Look up the table row for an intent
pub fn rule_for(intent: CriterionIntent) -> Option<&'static IntentRule> {
    INTENT_RULES.iter().find(|rule| rule.intent == intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_without_response_text() {
        assert_eq!(classify("Mentions emergency"), vec![CriterionIntent::Urgency]);
        assert_eq!(classify("Recommends doctor"), vec![CriterionIntent::DoctorReferral]);
        assert_eq!(
            classify("Recognizes medical emergency"),
            vec![CriterionIntent::DoctorReferral, CriterionIntent::Urgency]
        );
        assert_eq!(classify("Includes disclaimer"), vec![CriterionIntent::Disclaimer]);
        assert!(classify("Uses a friendly tone").is_empty());
    }

    #[test]
    fn test_penalty_is_listed_first() {
        let intents = classify("Advises the user to avoid seeing a doctor");
        assert_eq!(intents.first(), Some(&CriterionIntent::Penalty));
        assert!(intents.contains(&CriterionIntent::DoctorReferral));
    }

    #[test]
    fn test_every_intent_has_one_rule() {
        for rule in INTENT_RULES {
            let count = INTENT_RULES.iter().filter(|r| r.intent == rule.intent).count();
            assert_eq!(count, 1, "{:?} appears {} times", rule.intent, count);
            assert!(rule.triggers.iter().all(|t| *t == t.to_lowercase()));
        }
    }

    #[test]
    fn test_structured_evidence_needs_length_and_marker() {
        let rule = rule_for(CriterionIntent::Structure).unwrap();
        let short = "请休息。";
        let long_plain = "a".repeat(60);
        let long_marked = format!("{}。", "多".repeat(60));
        assert!(!rule.satisfied_by(short, short));
        assert!(!rule.satisfied_by(&long_plain, &long_plain));
        assert!(rule.satisfied_by(&long_marked, &long_marked));
    }

    #[test]
    fn test_latin_family_matches_lowercased_response() {
        let rule = rule_for(CriterionIntent::Urgency).unwrap();
        let response = "Please go to the Emergency room RIGHT AWAY.";
        assert!(rule.satisfied_by(response, &response.to_lowercase()));
    }

    #[test]
    fn test_family_haystack_follows_script() {
        let latin = KeywordFamily {
            script: Script::Latin,
            keywords: &["emergency"],
        };
        let han = KeywordFamily {
            script: Script::Han,
            keywords: &["紧急"],
        };
        let response = "EMERGENCY：紧急";
        let lower = response.to_lowercase();

        assert!(latin.found_in(response, &lower));
        assert!(!latin.found_in(response, response));
        assert!(han.found_in(response, ""));
        assert!(!han.found_in("", &lower));
    }
}
