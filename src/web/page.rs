use eyre::{eyre, Result};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::controller::Rendered;
use crate::format::{Line, SqlCheck};
use crate::session::Session;

pub const TITLE: &str = "SmolLM2-FT-SQL: NL2SQL Demo";

const INDEX: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }}</title>
    <style>
        :root {
            --bg: #ffffff;
            --text: #31333f;
            --muted: #808495;
            --accent: #ff4b4b;
            --code-bg: #f0f2f6;
            --ok: #09ab3b;
            --bad: #d97706;
        }
        * { box-sizing: border-box; }
        body {
            font-family: "Source Sans Pro", system-ui, sans-serif;
            background: var(--bg);
            color: var(--text);
            max-width: 46rem;
            margin: 0 auto;
            padding: 3rem 1rem;
        }
        h1 { font-size: 2.2rem; margin-bottom: 1.5rem; }
        form { margin: 0 0 1rem 0; }
        label { display: block; font-size: 0.9rem; margin-bottom: 0.4rem; }
        textarea {
            width: 100%;
            min-height: 6rem;
            padding: 0.6rem;
            font: inherit;
            border: 1px solid #d6d6d9;
            border-radius: 0.4rem;
            background: var(--code-bg);
            resize: vertical;
        }
        button {
            font: inherit;
            padding: 0.4rem 0.9rem;
            border: 1px solid #d6d6d9;
            border-radius: 0.4rem;
            background: var(--bg);
            cursor: pointer;
        }
        button:hover { border-color: var(--accent); color: var(--accent); }
        button:disabled { opacity: 0.5; cursor: progress; }
        .actions { margin-top: 0.8rem; display: flex; gap: 1rem; align-items: center; }
        #spinner { display: none; color: var(--muted); }
        #spinner.active { display: inline; }
        ol.code {
            background: var(--code-bg);
            border-radius: 0.4rem;
            padding: 1rem 1rem 1rem 3.2rem;
            margin: 1.5rem 0 0.5rem 0;
            font-family: "Source Code Pro", ui-monospace, monospace;
            font-size: 0.9rem;
            line-height: 1.45;
        }
        ol.code li { white-space: pre-wrap; word-break: break-word; min-height: 1.3em; }
        ol.code li::marker { color: var(--muted); }
        .keyword { color: #0054a3; font-weight: 600; }
        .ident { color: #31333f; }
        .string { color: #067d17; }
        .number { color: #a14f00; }
        .comment { color: var(--muted); font-style: italic; }
        .punct { color: #6b6f80; }
        .check { font-size: 0.85rem; }
        .check.valid { color: var(--ok); }
        .check.invalid { color: var(--bad); }
        .error {
            background: #ffeded;
            color: #7d353b;
            border-radius: 0.4rem;
            padding: 1rem;
            margin-top: 1.5rem;
            white-space: pre-wrap;
        }
        details { margin-top: 0.8rem; color: var(--muted); font-size: 0.85rem; }
        details pre { white-space: pre-wrap; }
    </style>
</head>
<body>
    <h1>{{ title }}</h1>

    <form method="post" action="/random">
        <button type="submit">Insert random question</button>
    </form>

    <form method="post" action="/generate" id="generate">
        <label for="question">Enter your question:</label>
        <textarea id="question" name="question" data-state="{{ input_state }}">{{ question }}</textarea>
        <div class="actions">
            <button type="submit" id="submit">Generate SQL</button>
            <span id="spinner">Generating...</span>
        </div>
    </form>

    {% if error %}
    <div class="error">{{ error }}</div>
    {% endif %}

    {% if output %}
    <ol class="code" data-language="sql">
        {%- for line in output.lines %}
        <li>{% for span in line %}<span class="{{ span.class }}">{{ span.text }}</span>{% endfor %}</li>
        {%- endfor %}
    </ol>
    {% if output.check.status == "valid" %}
    <span class="check valid">Parses as {{ output.check.statements }} statement(s), {{ output.elapsed_ms }} ms</span>
    {% else %}
    <span class="check invalid">Does not parse: {{ output.check.reason }}</span>
    {% endif %}
    <details>
        <summary>Raw model output</summary>
        <pre>{{ output.generated_text }}</pre>
    </details>
    {% endif %}

    <script>
        document.getElementById("generate").addEventListener("submit", function () {
            document.getElementById("submit").disabled = true;
            document.getElementById("spinner").classList.add("active");
        });
    </script>
</body>
</html>
"##;

#[derive(Debug, Serialize)]
struct OutputView<'a> {
    generated_text: &'a str,
    lines: &'a [Line],
    check: &'a SqlCheck,
    elapsed_ms: u64,
}

impl<'a> From<&'a Rendered> for OutputView<'a> {
    fn from(r: &'a Rendered) -> Self {
        Self {
            generated_text: &r.generated_text,
            lines: &r.lines,
            check: &r.check,
            elapsed_ms: r.elapsed.as_millis() as u64,
        }
    }
}

/// HTML templates for the single page.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX)
            .map_err(|e| eyre!("bad page template: {e:#}"))?;

        Ok(Self { env })
    }

    /// The page for `session`, optionally with the result of a generate
    /// action (or the message of its failure).
    pub fn index(
        &self,
        session: &Session,
        output: Option<&Rendered>,
        error: Option<&str>,
    ) -> Result<String> {
        self.env
            .get_template("index.html")
            .and_then(|t| {
                t.render(context! {
                    title => TITLE,
                    question => session.question(),
                    input_state => session.input(),
                    output => output.map(OutputView::from),
                    error => error,
                })
            })
            .map_err(|e| eyre!("failed to render page: {e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::format;

    fn rendered(sql: &str) -> Rendered {
        Rendered {
            question: "q".into(),
            generated_text: sql.to_lowercase(),
            sql: sql.into(),
            lines: format::highlight(sql),
            check: format::check(sql),
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn empty_page_has_the_widgets() {
        let html = Pages::new()
            .unwrap()
            .index(&Session::default(), None, None)
            .unwrap();

        assert!(html.contains(TITLE));
        assert!(html.contains("Insert random question"));
        assert!(html.contains("Enter your question:"));
        assert!(html.contains("Generate SQL"));
        assert!(html.contains(r#"data-state="empty""#));
        assert!(!html.contains(r#"class="code""#));
    }

    #[test]
    fn question_is_escaped() {
        let mut session = Session::default();
        session.edit("<script>alert(1)</script>");

        let html = Pages::new().unwrap().index(&session, None, None).unwrap();

        assert!(html.contains("&lt;script&gt;alert(1)"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains(r#"data-state="user_edited""#));
    }

    #[test]
    fn output_renders_numbered_lines() {
        let out = rendered("SELECT\n  *\nFROM\n  employees");

        let html = Pages::new()
            .unwrap()
            .index(&Session::default(), Some(&out), None)
            .unwrap();

        assert_eq!(html.matches("<li>").count(), 4);
        assert!(html.contains(r#"<span class="keyword">SELECT</span>"#));
        assert!(html.contains("Parses as 1 statement(s), 12 ms"));
        assert!(html.contains("Raw model output"));
    }

    #[test]
    fn errors_render_in_place_of_output() {
        let html = Pages::new()
            .unwrap()
            .index(&Session::default(), None, Some("generation failed: out of memory"))
            .unwrap();

        assert!(html.contains(r#"<div class="error">generation failed: out of memory</div>"#));
        assert!(!html.contains(r#"class="code""#));
    }
}
