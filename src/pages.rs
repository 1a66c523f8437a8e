//! HTML rendering for the three pages.
//!
//! Templates live in `templates/` and are compiled into the binary. Every
//! page shares the chrome from `base.html` (title, icon, sidebar
//! disclaimer); each page supplies its own body context.
//!
//! | Page | Template | Title |
//! |------|----------|-------|
//! | Landing | `home.html` | Home Page |
//! | Docs chat | `chat.html` | Chat with Arbitrum Docs 🤖 |
//! | Contract debugger | `debugger.html` | Smart Contract Debugger/Generator 🛠️ |

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

use crate::config::UiConfig;
use crate::models::{ContractMode, Turn};
use crate::prompts::{example_grid, EXAMPLE_COLUMNS};

const TEMPLATES: [(&str, &str); 4] = [
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("chat.html", include_str!("../templates/chat.html")),
    ("debugger.html", include_str!("../templates/debugger.html")),
];

#[derive(Serialize)]
struct PageContext<'a, T: Serialize> {
    page_title: &'a str,
    icon_url: &'a str,
    disclaimer: &'a str,
    show_disclaimer: bool,
    #[serde(flatten)]
    body: T,
}

/// Body context for the docs chat page.
#[derive(Debug, Default, Serialize)]
pub struct ChatView<'a> {
    pub turns: &'a [Turn],
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// Model output shown under the debugger form.
#[derive(Debug, Clone, Serialize)]
pub struct ContractResult {
    pub heading: &'static str,
    pub output: String,
}

/// Body context for the contract debugger page.
#[derive(Debug, Serialize)]
pub struct DebuggerView {
    #[serde(skip)]
    pub mode: ContractMode,
    pub code: String,
    pub result: Option<ContractResult>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

impl Default for DebuggerView {
    fn default() -> Self {
        Self {
            mode: ContractMode::Debug,
            code: String::new(),
            result: None,
            notice: None,
            error: None,
        }
    }
}

#[derive(Serialize)]
struct ModeOption {
    value: &'static str,
    label: &'static str,
    spinner: &'static str,
    submit: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    example_columns: Vec<Vec<&'static str>>,
    columns: usize,
    #[serde(flatten)]
    view: &'a ChatView<'a>,
}

#[derive(Serialize)]
struct DebuggerBody<'a> {
    modes: Vec<ModeOption>,
    submit_label: &'static str,
    #[serde(flatten)]
    view: &'a DebuggerView,
}

#[derive(Serialize)]
struct Empty {}

pub struct Pages {
    env: Environment<'static>,
    ui: UiConfig,
}

impl Pages {
    pub fn new(ui: &UiConfig) -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("Failed to compile template {}", name))?;
        }
        Ok(Self {
            env,
            ui: ui.clone(),
        })
    }

    fn render<T: Serialize>(
        &self,
        template: &str,
        page_title: &str,
        show_disclaimer: bool,
        body: T,
    ) -> Result<String> {
        let ctx = PageContext {
            page_title,
            icon_url: &self.ui.icon_url,
            disclaimer: &self.ui.disclaimer,
            show_disclaimer,
            body,
        };
        self.env
            .get_template(template)?
            .render(ctx)
            .with_context(|| format!("Failed to render {}", template))
    }

    pub fn home(&self) -> Result<String> {
        self.render("home.html", "Home Page", false, Empty {})
    }

    pub fn chat(&self, view: &ChatView<'_>) -> Result<String> {
        let body = ChatBody {
            example_columns: example_grid(),
            columns: EXAMPLE_COLUMNS,
            view,
        };
        self.render("chat.html", "Chat with Arbitrum Docs 🤖", true, body)
    }

    pub fn debugger(&self, view: &DebuggerView) -> Result<String> {
        let modes = ContractMode::ALL
            .iter()
            .map(|m| ModeOption {
                value: m.as_str(),
                label: m.label(),
                spinner: m.spinner_text(),
                submit: m.submit_label(),
                selected: *m == view.mode,
            })
            .collect();
        let body = DebuggerBody {
            modes,
            submit_label: view.mode.submit_label(),
            view,
        };
        self.render(
            "debugger.html",
            "Smart Contract Debugger/Generator 🛠️",
            true,
            body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transcript;
    use crate::prompts::EXAMPLE_PROMPTS;

    fn pages() -> Pages {
        Pages::new(&UiConfig::default()).unwrap()
    }

    #[test]
    fn test_home_links_both_tools() {
        let html = pages().home().unwrap();
        assert!(html.contains("<title>Home Page</title>"));
        assert!(html.contains("Welcome to ArbGPT!"));
        assert!(html.contains("href=\"/chat\""));
        assert!(html.contains("href=\"/debugger\""));
        assert!(!html.contains("class=\"disclaimer\""));
    }

    #[test]
    fn test_chat_renders_examples_and_turns_in_order() {
        let mut t = Transcript::new();
        t.append_exchange("What is ArbOS?", "An operating system.");
        let html = pages()
            .chat(&ChatView {
                turns: t.turns(),
                ..ChatView::default()
            })
            .unwrap();

        assert!(html.contains("ArbGPT can make mistakes."));
        for prompt in EXAMPLE_PROMPTS {
            assert!(html.contains(prompt), "missing example: {}", prompt);
        }
        let q = html.find("An operating system.").unwrap();
        let user = html.rfind("What is ArbOS?").unwrap();
        assert!(user < q);
    }

    #[test]
    fn test_chat_escapes_content() {
        let mut t = Transcript::new();
        t.append_exchange("<script>alert(1)</script>", "ok");
        let html = pages()
            .chat(&ChatView {
                turns: t.turns(),
                ..ChatView::default()
            })
            .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_debugger_submit_button_follows_mode() {
        let html = pages().debugger(&DebuggerView::default()).unwrap();
        assert!(html.contains("<button type=\"submit\">Submit Debug Request</button>"));
        assert!(!html.contains("Submit Request<"));
    }

    #[test]
    fn test_debugger_shows_result_as_solidity_block() {
        let view = DebuggerView {
            mode: ContractMode::Generate,
            code: "contract A {}".to_string(),
            result: Some(ContractResult {
                heading: ContractMode::Generate.results_heading(),
                output: "contract B {}".to_string(),
            }),
            ..DebuggerView::default()
        };
        let html = pages().debugger(&view).unwrap();
        assert!(html.contains("Code Generation Results"));
        assert!(html.contains("language-solidity"));
        assert!(html.contains("class=\"disclaimer\""));
        assert!(html.contains("contract B {}"));
        assert!(html.contains(
            "value=\"generate\" data-spinner=\"Generating code...\" data-submit=\"Submit Generate Request\" checked"
        ));
        assert!(html.contains("<button type=\"submit\">Submit Generate Request</button>"));
    }
}
