//! Step gate
//!
//! The study is a linear wizard. Entering a step requires its predecessor
//! to be complete in the session; otherwise the participant is sent to the
//! predecessor's entry point. Revisiting completed steps is allowed.

use crate::session::StudySession;
use axum::response::Redirect;
use nrs_common::articles::ArticleId;
use nrs_common::study::StudyProfile;

/// Named wizard steps in study order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Landing,
    Demographics,
    PreQuestionnaire,
    Instructions,
    Article,
    MidQuestionnaire,
    PostQuestionnaire,
    ThankYou,
}

impl Step {
    /// Route of the step (article pages carry an id, see [`article_path`])
    pub fn path(self) -> &'static str {
        match self {
            Step::Landing => "/",
            Step::Demographics => "/demographics",
            Step::PreQuestionnaire => "/pre-questionnaire",
            Step::Instructions => "/instructions",
            Step::Article => "/article",
            Step::MidQuestionnaire => "/mid-questionnaire",
            Step::PostQuestionnaire => "/post-questionnaire",
            Step::ThankYou => "/thank-you",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Landing => "landing",
            Step::Demographics => "demographics",
            Step::PreQuestionnaire => "pre_questionnaire",
            Step::Instructions => "instructions",
            Step::Article => "article",
            Step::MidQuestionnaire => "mid_questionnaire",
            Step::PostQuestionnaire => "post_questionnaire",
            Step::ThankYou => "thank_you",
        }
    }
}

pub fn article_path(id: ArticleId) -> String {
    format!("/article/{}", id)
}

/// Where the article step is entered for the current round
///
/// The article being rated wins, then the one picked for the next round,
/// then the first article chosen after the pre-questionnaire.
pub fn article_entry(session: &StudySession) -> String {
    session
        .current_article
        .or(session.next_article)
        .or(session.first_article_id)
        .map(article_path)
        .unwrap_or_else(|| Step::Instructions.path().to_string())
}

/// Entry point of a step for this session
pub fn entry_path(step: Step, session: &StudySession) -> String {
    match step {
        Step::Article => article_entry(session),
        other => other.path().to_string(),
    }
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Redirect(String),
}

/// Decide whether `step` may be served
pub fn check(step: Step, session: &StudySession, profile: &StudyProfile) -> Access {
    let total = profile.total_rounds;
    let require = |pred: Step, extra: bool| {
        if session.is_completed(pred) && extra {
            Access::Allowed
        } else {
            Access::Redirect(entry_path(pred, session))
        }
    };

    match step {
        Step::Landing | Step::Demographics => Access::Allowed,
        Step::PreQuestionnaire => require(Step::Demographics, true),
        Step::Instructions => require(Step::PreQuestionnaire, true),
        Step::Article => require(Step::Instructions, true),
        Step::MidQuestionnaire => {
            if !profile.mid_questionnaire {
                return Access::Redirect(resume_path(session, profile));
            }
            require(Step::Article, session.rounds_completed >= session.round)
        }
        Step::PostQuestionnaire => {
            if !profile.post_questionnaire {
                return Access::Redirect(resume_path(session, profile));
            }
            if profile.mid_questionnaire {
                require(
                    Step::MidQuestionnaire,
                    session.rounds_completed >= total && session.mid_rounds_completed >= total,
                )
            } else {
                require(Step::Article, session.rounds_completed >= total)
            }
        }
        Step::ThankYou => {
            let pred = if profile.post_questionnaire {
                Step::PostQuestionnaire
            } else {
                Step::Article
            };
            if session.is_completed(Step::PostQuestionnaire) && session.rounds_completed >= total {
                Access::Allowed
            } else {
                Access::Redirect(entry_path(pred, session))
            }
        }
    }
}

/// Redirect for a step that may not be served, `None` when allowed
pub fn guard(step: Step, session: &StudySession, profile: &StudyProfile) -> Option<Redirect> {
    match check(step, session, profile) {
        Access::Allowed => None,
        Access::Redirect(to) => Some(Redirect::to(&to)),
    }
}

/// Furthest step the participant can currently work on
pub fn resume_path(session: &StudySession, profile: &StudyProfile) -> String {
    for step in [Step::Demographics, Step::PreQuestionnaire, Step::Instructions] {
        if !session.is_completed(step) {
            return step.path().to_string();
        }
    }

    let total = profile.total_rounds;
    if session.rounds_completed < session.round.min(total) {
        return article_entry(session);
    }
    if profile.mid_questionnaire && session.mid_rounds_completed < session.rounds_completed {
        return Step::MidQuestionnaire.path().to_string();
    }
    if session.rounds_completed < total {
        return article_entry(session);
    }
    if profile.post_questionnaire && !session.is_completed(Step::PostQuestionnaire) {
        return Step::PostQuestionnaire.path().to_string();
    }
    Step::ThankYou.path().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_after_instructions() -> StudySession {
        let mut s = StudySession::new();
        s.prolific_id = Some("P1".into());
        s.complete(Step::Demographics);
        s.complete(Step::PreQuestionnaire);
        s.complete(Step::Instructions);
        s.first_article_id = Some(ArticleId(5));
        s
    }

    #[test]
    fn test_article_without_instructions_redirects_to_instructions() {
        let mut s = StudySession::new();
        s.complete(Step::Demographics);
        s.complete(Step::PreQuestionnaire);

        let profile = StudyProfile::six_round();
        assert_eq!(
            check(Step::Article, &s, &profile),
            Access::Redirect("/instructions".into())
        );
    }

    #[test]
    fn test_each_step_redirects_to_its_predecessor() {
        let s = StudySession::new();
        let profile = StudyProfile::three_round();
        assert_eq!(check(Step::Demographics, &s, &profile), Access::Allowed);
        assert_eq!(
            check(Step::PreQuestionnaire, &s, &profile),
            Access::Redirect("/demographics".into())
        );
        assert_eq!(
            check(Step::Instructions, &s, &profile),
            Access::Redirect("/pre-questionnaire".into())
        );
    }

    #[test]
    fn test_mid_questionnaire_needs_current_round_rated() {
        let profile = StudyProfile::three_round();
        let mut s = session_after_instructions();
        s.current_article = Some(ArticleId(5));

        assert_eq!(
            check(Step::MidQuestionnaire, &s, &profile),
            Access::Redirect("/article/5".into())
        );

        s.complete(Step::Article);
        s.rounds_completed = 1;
        assert_eq!(check(Step::MidQuestionnaire, &s, &profile), Access::Allowed);

        // Next round started but not rated yet
        s.round = 2;
        s.current_article = Some(ArticleId(8));
        assert_eq!(
            check(Step::MidQuestionnaire, &s, &profile),
            Access::Redirect("/article/8".into())
        );
    }

    #[test]
    fn test_disabled_mid_questionnaire_resumes_study() {
        let profile = StudyProfile::six_round();
        let s = session_after_instructions();
        assert_eq!(
            check(Step::MidQuestionnaire, &s, &profile),
            Access::Redirect("/article/5".into())
        );
    }

    #[test]
    fn test_thank_you_requires_all_rounds_and_post() {
        let profile = StudyProfile::three_round();
        let mut s = session_after_instructions();
        s.complete(Step::Article);
        s.complete(Step::MidQuestionnaire);
        s.complete(Step::PostQuestionnaire);
        s.rounds_completed = 2;
        s.mid_rounds_completed = 2;
        assert!(matches!(check(Step::ThankYou, &s, &profile), Access::Redirect(_)));

        s.rounds_completed = 3;
        s.mid_rounds_completed = 3;
        assert_eq!(check(Step::ThankYou, &s, &profile), Access::Allowed);
    }

    #[test]
    fn test_post_questionnaire_waits_for_last_mid() {
        let profile = StudyProfile::three_round();
        let mut s = session_after_instructions();
        s.round = 3;
        s.complete(Step::Article);
        s.complete(Step::MidQuestionnaire);
        s.rounds_completed = 3;
        s.mid_rounds_completed = 2;
        assert_eq!(
            check(Step::PostQuestionnaire, &s, &profile),
            Access::Redirect("/mid-questionnaire".into())
        );

        s.mid_rounds_completed = 3;
        assert_eq!(check(Step::PostQuestionnaire, &s, &profile), Access::Allowed);
    }

    #[test]
    fn test_resume_path_follows_progress() {
        let profile = StudyProfile::three_round();
        let mut s = StudySession::new();
        assert_eq!(resume_path(&s, &profile), "/demographics");

        s = session_after_instructions();
        assert_eq!(resume_path(&s, &profile), "/article/5");

        s.rounds_completed = 1;
        assert_eq!(resume_path(&s, &profile), "/mid-questionnaire");

        s.mid_rounds_completed = 1;
        s.round = 2;
        s.next_article = Some(ArticleId(9));
        assert_eq!(resume_path(&s, &profile), "/article/9");

        s.round = 3;
        s.rounds_completed = 3;
        s.mid_rounds_completed = 3;
        assert_eq!(resume_path(&s, &profile), "/post-questionnaire");

        s.complete(Step::PostQuestionnaire);
        assert_eq!(resume_path(&s, &profile), "/thank-you");
    }
}
