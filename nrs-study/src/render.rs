//! Page rendering
//!
//! Handlers build a typed [`Page`] context and hand it to the configured
//! [`Renderer`]. [`HtmlRenderer`] produces plain HTML forms whose field
//! names are the ones `forms` reads back.

use crate::flow::selector::RoundTopics;
use crate::forms::{DONT_KNOW, OTHER, POST_LIKERT_ITEMS, UNDERAGE};
use nrs_common::articles::Article;
use nrs_common::ratings::{LabelStatement, RecStatement};
use nrs_common::study::Condition;

/// Turns a page context into markup
pub trait Renderer: Send + Sync {
    fn render(&self, page: &Page<'_>) -> String;
}

/// Everything the article step shows
#[derive(Debug)]
pub struct ArticleView<'a> {
    pub article: &'a Article,
    /// Author, or a placeholder when the corpus has none
    pub author: String,
    /// Publish date, or a synthetic recent date
    pub date: String,
    pub recommendations: Vec<&'a Article>,
    pub round: u32,
    pub total_rounds: u32,
    pub condition: Option<Condition>,
    /// Selection metadata, shown with `?debug=1`
    pub debug: Option<ArticleDebug<'a>>,
}

#[derive(Debug)]
pub struct ArticleDebug<'a> {
    pub topic_column: &'a str,
    pub topics: &'a RoundTopics,
}

#[derive(Debug)]
pub enum Page<'a> {
    Landing {
        participant_known: bool,
    },
    Demographics {
        error: Option<&'a str>,
    },
    PreQuestionnaire {
        /// Survey labels of topic list A
        list_a: Vec<&'a str>,
        /// Survey labels of topic list B
        list_b: Vec<&'a str>,
        error: Option<&'a str>,
    },
    Instructions {
        total_rounds: u32,
    },
    Article(ArticleView<'a>),
    MidQuestionnaire {
        article: Option<&'a Article>,
        condition: Option<Condition>,
        error: Option<&'a str>,
    },
    PostQuestionnaire {
        condition: Option<Condition>,
        error: Option<&'a str>,
    },
    ThankYou {
        condition: Option<Condition>,
        message: Option<&'a str>,
    },
    Message {
        title: &'a str,
        message: &'a str,
    },
}

impl Page<'_> {
    pub fn title(&self) -> &'static str {
        match self {
            Page::Landing { .. } => "News Study",
            Page::Demographics { .. } => "About You",
            Page::PreQuestionnaire { .. } => "Your News Habits",
            Page::Instructions { .. } => "Instructions",
            Page::Article(_) => "Article",
            Page::MidQuestionnaire { .. } => "Quick Questions",
            Page::PostQuestionnaire { .. } => "Final Questions",
            Page::ThankYou { .. } => "Thank You",
            Page::Message { .. } => "News Study",
        }
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal server-side HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, page: &Page<'_>) -> String {
        let body = match page {
            Page::Landing { participant_known } => landing(*participant_known),
            Page::Demographics { error } => demographics(*error),
            Page::PreQuestionnaire { list_a, list_b, error } => pre_questionnaire(list_a, list_b, *error),
            Page::Instructions { total_rounds } => instructions(*total_rounds),
            Page::Article(view) => article(view),
            Page::MidQuestionnaire { article, condition, error } => mid_questionnaire(*article, *condition, *error),
            Page::PostQuestionnaire { condition, error } => post_questionnaire(*condition, *error),
            Page::ThankYou { condition, message } => thank_you(*condition, *message),
            Page::Message { title, message } => format!(
                "<h1>{}</h1>\n<p>{}</p>",
                escape_html(title),
                escape_html(message)
            ),
        };
        layout(page.title(), &body)
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: Georgia, 'Times New Roman', serif;
            max-width: 760px;
            margin: 0 auto;
            padding: 20px;
            color: #222;
            line-height: 1.6;
        }}
        fieldset {{
            border: 1px solid #ddd;
            margin-bottom: 16px;
        }}
        .error {{
            color: #b00020;
            font-weight: bold;
        }}
        .recommendation {{
            border-top: 1px solid #ccc;
            padding-top: 12px;
        }}
        .label {{
            display: inline-block;
            padding: 4px 10px;
            border-radius: 4px;
            font-family: sans-serif;
            font-size: 13px;
        }}
        .label-color {{
            background: linear-gradient(90deg, #1e8f4e, #8bc34a, #ffeb3b, #ff9800, #e53935);
            color: #000;
        }}
        .label-no_color {{
            background: #e0e0e0;
            color: #000;
        }}
        .label-c2pa {{
            border: 2px solid #000;
        }}
        .debug {{
            font-family: monospace;
            font-size: 12px;
            color: #666;
        }}
    </style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(title),
        body = body,
    )
}

fn error_block(error: Option<&str>) -> String {
    error
        .map(|e| format!("<p class=\"error\">{}</p>\n", escape_html(e)))
        .unwrap_or_default()
}

fn select(name: &str, prompt: &str, options: &[&str]) -> String {
    let mut html = format!(
        "<label>{}<br><select name=\"{}\">\n<option value=\"\"></option>\n",
        escape_html(prompt),
        name
    );
    for option in options {
        let option = escape_html(option);
        html.push_str(&format!("<option value=\"{0}\">{0}</option>\n", option));
    }
    html.push_str("</select></label><br>\n");
    html
}

fn checkboxes(name: &str, prompt: &str, options: &[&str]) -> String {
    let mut html = format!("<fieldset><legend>{}</legend>\n", escape_html(prompt));
    for option in options {
        let option = escape_html(option);
        html.push_str(&format!(
            "<label><input type=\"checkbox\" name=\"{}\" value=\"{1}\"> {1}</label><br>\n",
            name, option
        ));
    }
    html.push_str("</fieldset>\n");
    html
}

fn text_input(name: &str, prompt: &str) -> String {
    format!(
        "<label>{}<br><input type=\"text\" name=\"{}\"></label><br>\n",
        escape_html(prompt),
        name
    )
}

/// Five-point scale; `required` marks the first radio
fn likert(name: &str, prompt: &str, required: bool) -> String {
    let mut html = format!("<fieldset><legend>{}</legend>\n", escape_html(prompt));
    for value in 1..=5 {
        let req = if required && value == 1 { " required" } else { "" };
        html.push_str(&format!(
            "<label><input type=\"radio\" name=\"{}\" value=\"{}\"{}> {}</label>\n",
            name, value, req, value
        ));
    }
    html.push_str("</fieldset>\n");
    html
}

fn landing(participant_known: bool) -> String {
    if participant_known {
        "<h1>News Reading Study</h1>\n\
         <p>In this study you will read a few news articles and tell us what you think of the \
         articles recommended next to them.</p>\n\
         <form method=\"get\" action=\"/demographics\"><button type=\"submit\">Start</button></form>"
            .to_string()
    } else {
        "<h1>News Reading Study</h1>\n\
         <p>Please open this study through the link provided by the recruitment platform.</p>"
            .to_string()
    }
}

fn demographics(error: Option<&str>) -> String {
    let mut html = String::from("<h1>About You</h1>\n");
    html.push_str(&error_block(error));
    html.push_str("<form method=\"post\" action=\"/demographics\">\n");
    html.push_str(&select(
        "gender",
        "Gender",
        &["Woman", "Man", "Non-binary", "Self-describe", "Prefer not to say"],
    ));
    html.push_str(&text_input("gender_self_describe", "If self-describing:"));
    html.push_str(&select(
        "age_group",
        "Age",
        &[UNDERAGE, "16-24", "25-34", "35-44", "45-54", "55-64", "65 or older"],
    ));
    html.push_str(&select("country", "Country of residence", &["Norway", "United Kingdom", "United States", OTHER]));
    html.push_str(&text_input("other_country", "Other country:"));
    html.push_str(&select(
        "education",
        "Highest completed education",
        &["Primary school", "Secondary school", "Bachelor's", "Master's", "PhD", OTHER],
    ));
    html.push_str(&text_input("other_education", "Other education:"));
    html.push_str(&select(
        "political_leaning",
        "Political leaning",
        &["Left", "Centre-left", "Centre", "Centre-right", "Right", "Prefer not to say", OTHER],
    ));
    html.push_str(&text_input("political_leaning_other", "Other leaning:"));
    html.push_str("<button type=\"submit\">Continue</button>\n</form>");
    html
}

fn pre_questionnaire(list_a: &[&str], list_b: &[&str], error: Option<&str>) -> String {
    let frequencies = ["Several times a day", "Daily", "Weekly", "Less often", "Never"];
    let agreement = ["1", "2", "3", "4", "5"];

    let mut html = String::from("<h1>Your News Habits</h1>\n");
    html.push_str(&error_block(error));
    html.push_str("<form method=\"post\" action=\"/pre-questionnaire\">\n");
    html.push_str(&select("news_frequency", "How often do you read news?", &frequencies));
    html.push_str(&select(
        "platform",
        "Where do you usually read news?",
        &["News websites", "Social media", "Television", "Print", OTHER],
    ));
    html.push_str(&text_input("platform_other", "Other platform:"));

    html.push_str(&select("favourite_topic_1", "Which of these topics do you like most?", list_a));
    html.push_str(&select("least_favourite_topic_1", "Which of these topics do you like least?", list_a));
    html.push_str(&select("enjoy_topic_1", "I enjoy reading about my favourite topic.", &agreement));
    html.push_str(&select("avoid_topic_1", "I avoid my least favourite topic.", &agreement));

    html.push_str(&select("favourite_topic_2", "Which of these topics do you like most?", list_b));
    html.push_str(&select("least_favourite_topic_2", "Which of these topics do you like least?", list_b));
    html.push_str(&select("enjoy_topic_2", "I enjoy reading about my favourite topic.", &agreement));
    html.push_str(&select("avoid_topic_2", "I avoid my least favourite topic.", &agreement));

    html.push_str(&select("attention_check", "To show you are paying attention, select 3.", &agreement));
    html.push_str(&select("avoid_news", "Do you sometimes avoid the news?", &["Often", "Sometimes", "Rarely", "Never"]));
    html.push_str(&checkboxes(
        "avoid_reasons",
        "Why do you avoid the news?",
        &["too negative", "too much", "not trustworthy", "no time", "other"],
    ));
    html.push_str(&text_input("avoid_other", "Other reason:"));
    html.push_str("<button type=\"submit\">Continue</button>\n</form>");
    html
}

fn instructions(total_rounds: u32) -> String {
    format!(
        "<h1>Instructions</h1>\n\
         <p>You will read {} news articles. Below each article two further articles are recommended; \
         please rate each recommendation before continuing.</p>\n\
         <form method=\"post\" action=\"/instructions\"><button type=\"submit\">Begin</button></form>",
        total_rounds
    )
}

fn label_badge(condition: Option<Condition>) -> String {
    match condition {
        Some(c @ (Condition::Color | Condition::NoColor)) => format!(
            "<span class=\"label label-{}\">Trustworthiness grade A&ndash;E</span>\n",
            c.as_str()
        ),
        Some(Condition::C2pa) => "<span class=\"label label-c2pa\">CR Content Credentials</span>\n".to_string(),
        Some(Condition::Nolabel) | None => String::new(),
    }
}

fn article(view: &ArticleView<'_>) -> String {
    let a = view.article;
    let shows_label = view.condition.map(|c| c.shows_label()).unwrap_or(false);

    let mut html = format!(
        "<p>Article {} of {}</p>\n<h1>{}</h1>\n<p><em>{} &middot; {}</em></p>\n",
        view.round,
        view.total_rounds,
        escape_html(&a.title),
        escape_html(&view.author),
        escape_html(&view.date)
    );
    if !a.image_url.is_empty() {
        html.push_str(&format!("<img src=\"{}\" alt=\"\" width=\"100%\">\n", escape_html(&a.image_url)));
    }
    for paragraph in a.content.split("\n\n").filter(|p| !p.trim().is_empty()) {
        html.push_str(&format!("<p>{}</p>\n", escape_html(paragraph.trim())));
    }

    html.push_str(&format!("<form method=\"post\" action=\"/article/{}\">\n", a.id));
    html.push_str("<h2>Recommended for you</h2>\n");
    for rec in &view.recommendations {
        html.push_str("<div class=\"recommendation\">\n");
        html.push_str(&format!("<h3>{}</h3>\n", escape_html(&rec.title)));
        if shows_label {
            html.push_str(&label_badge(view.condition));
        }
        for statement in RecStatement::ALL {
            html.push_str(&likert(
                &format!("{}_{}", statement.as_str(), rec.id),
                statement.prompt(),
                false,
            ));
        }
        html.push_str("</div>\n");
    }
    if shows_label {
        html.push_str("<h2>About the labels</h2>\n");
        for statement in LabelStatement::ALL {
            html.push_str(&likert(statement.key(), statement.prompt(), false));
        }
    }
    html.push_str("<button type=\"submit\">Continue</button>\n</form>\n");

    if let Some(debug) = &view.debug {
        let t = debug.topics;
        html.push_str(&format!(
            "<p class=\"debug\">topic column: {} | start list: {} | list: {} | favourite: {} | least favourite: {}</p>\n",
            escape_html(debug.topic_column),
            t.start.as_str(),
            t.list.as_str(),
            escape_html(t.favourite.as_deref().unwrap_or("-")),
            escape_html(t.least_favourite.as_deref().unwrap_or("-"))
        ));
    }
    html
}

fn mid_questionnaire(article: Option<&Article>, condition: Option<Condition>, error: Option<&str>) -> String {
    let mut html = String::from("<h1>Quick Questions</h1>\n");
    html.push_str(&error_block(error));
    if let Some(a) = article {
        html.push_str(&format!("<p>Next up: <strong>{}</strong></p>\n", escape_html(&a.title)));
    }
    html.push_str("<form method=\"post\" action=\"/mid-questionnaire\">\n");

    let mut elements = vec!["Headline", "Image", "Topic"];
    if condition.map(|c| c.shows_label()).unwrap_or(false) {
        elements.push("Label");
    }
    elements.extend([OTHER, DONT_KNOW]);
    html.push_str(&checkboxes(
        "choice_elements",
        "What influenced which recommendation you found most interesting?",
        &elements,
    ));
    html.push_str(&text_input("choice_elements_other", "Other:"));
    html.push_str(&likert("trust_article", "I trusted the article I just read.", false));
    html.push_str(&likert("trust_image", "I trusted the image in the article.", false));
    html.push_str("<button type=\"submit\">Continue</button>\n</form>");
    html
}

fn post_questionnaire(condition: Option<Condition>, error: Option<&str>) -> String {
    let mut html = String::from("<h1>Final Questions</h1>\n");
    html.push_str(&error_block(error));
    html.push_str("<form method=\"post\" action=\"/post-questionnaire\">\n");
    html.push_str(&select(
        "confidence",
        "How confident were you in your ratings?",
        &["Very low", "Low", "Medium", "High", "Very high"],
    ));
    html.push_str(&select("familiar_trust_levels", "Have you seen trust labels on news before?", &["Yes", "No", "Not sure"]));
    html.push_str(&select("familiar_nutriscore", "Do you know the Nutri-Score food label?", &["Yes", "No", "Not sure"]));

    if let Some(c) = condition.filter(|c| c.shows_label()) {
        html.push_str(&checkboxes(
            "score_meaning",
            "What do you think the label tells you?",
            &["Source reliability", "Accuracy of the content", "Origin of the image", OTHER],
        ));
        html.push_str(&text_input("score_meaning_other", "Other:"));
        html.push_str(&checkboxes(
            "label_expectation",
            "What would you expect such a label to be based on?",
            &["Fact-checkers", "Algorithms", "Publisher self-assessment", OTHER],
        ));
        html.push_str(&text_input("label_expectation_other", "Other:"));
        if c.shows_grade() {
            html.push_str(&select(
                "grade_basis",
                "What do you think the grade was based on?",
                &["The publisher", "The author", "The article itself", OTHER],
            ));
            html.push_str(&text_input("grade_basis_other", "Other:"));
        }
        for item in POST_LIKERT_ITEMS {
            html.push_str(&likert(item, &item.replace('_', " "), true));
        }
    }

    html.push_str("<label>Anything else you want to tell us?<br><textarea name=\"feedback\"></textarea></label><br>\n");
    html.push_str("<button type=\"submit\">Finish</button>\n</form>");
    html
}

fn thank_you(condition: Option<Condition>, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("<h1>Thank You</h1>\n<p>{}</p>", escape_html(message)),
        None => format!(
            "<h1>Thank You</h1>\n<p>Your answers have been recorded. You may now return to the recruitment platform.</p>\n\
             <!-- condition: {} -->",
            condition.map(Condition::as_str).unwrap_or("none")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrs_common::articles::ArticleId;

    fn sample(id: i64, title: &str) -> Article {
        Article {
            id: ArticleId(id),
            stable_id: None,
            title: title.to_string(),
            content: "First.\n\nSecond.".to_string(),
            image_url: String::new(),
            author: None,
            publish_date: None,
            topic: "Politics".to_string(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_article_page_names_rating_inputs_by_recommendation_id() {
        let main = sample(1, "Main <story>");
        let rec_a = sample(17, "Rec A");
        let rec_b = sample(23, "Rec B");
        let page = Page::Article(ArticleView {
            article: &main,
            author: "Nora Larsen".into(),
            date: "March 04, 2025".into(),
            recommendations: vec![&rec_a, &rec_b],
            round: 2,
            total_rounds: 6,
            condition: Some(Condition::Color),
            debug: None,
        });
        let html = HtmlRenderer.render(&page);

        assert!(html.contains("Main &lt;story&gt;"));
        assert!(html.contains("action=\"/article/1\""));
        assert!(html.contains("name=\"likelihood_17\""));
        assert!(html.contains("name=\"relevant_23\""));
        assert!(html.contains("name=\"label_more\""));
        assert!(html.contains("label-color"));
        assert!(html.contains("Article 2 of 6"));
    }

    #[test]
    fn test_nolabel_article_has_no_label_items() {
        let main = sample(1, "Main");
        let page = Page::Article(ArticleView {
            article: &main,
            author: "A".into(),
            date: "D".into(),
            recommendations: vec![],
            round: 1,
            total_rounds: 3,
            condition: Some(Condition::Nolabel),
            debug: None,
        });
        let html = HtmlRenderer.render(&page);
        assert!(!html.contains("label_more"));
        assert!(!html.contains("class=\"label "));
    }

    #[test]
    fn test_post_questionnaire_fields_follow_condition() {
        let color = HtmlRenderer.render(&Page::PostQuestionnaire {
            condition: Some(Condition::Color),
            error: Some("Please answer all questions."),
        });
        assert!(color.contains("name=\"grade_basis\""));
        assert!(color.contains("name=\"attention_check\""));
        assert!(color.contains("Please answer all questions."));

        let c2pa = HtmlRenderer.render(&Page::PostQuestionnaire {
            condition: Some(Condition::C2pa),
            error: None,
        });
        assert!(!c2pa.contains("name=\"grade_basis\""));
        assert!(c2pa.contains("name=\"understood_label\""));

        let nolabel = HtmlRenderer.render(&Page::PostQuestionnaire {
            condition: Some(Condition::Nolabel),
            error: None,
        });
        assert!(!nolabel.contains("name=\"understood_label\""));
        assert!(nolabel.contains("name=\"confidence\""));
    }
}
