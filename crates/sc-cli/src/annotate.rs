use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LabelStyle {
    /// `<id> [<label>]`, as used for raw JSON viewers.
    Inline,
    /// `GA…<last six> [📒 <label>]`, as used for account links.
    Short,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Annotated {
    pub text: String,
    pub annotated: usize,
}

fn account_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"G[A-Z2-7]{55}").expect("valid regex"))
}

/// Labels every known account id in `text`. Ids that already carry their
/// inline label are left alone, so running twice is harmless.
pub(crate) fn annotate_text(
    text: &str,
    labels: &BTreeMap<String, String>,
    style: LabelStyle,
) -> Annotated {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut annotated = 0;

    for found in account_pattern().find_iter(text) {
        let account = found.as_str();
        let Some(label) = labels.get(account) else {
            continue;
        };

        output.push_str(&text[cursor..found.start()]);
        cursor = found.end();

        match style {
            LabelStyle::Inline => {
                let suffix = format!(" [{label}]");
                output.push_str(account);
                if !text[found.end()..].starts_with(&suffix) {
                    output.push_str(&suffix);
                    annotated += 1;
                }
            }
            LabelStyle::Short => {
                output.push_str(&short_form(account, label));
                annotated += 1;
            }
        }
    }

    output.push_str(&text[cursor..]);
    Annotated {
        text: output,
        annotated,
    }
}

fn short_form(account: &str, label: &str) -> String {
    let head = &account[..2];
    let tail = &account[account.len() - 6..];
    format!("{head}…{tail} [📒 {label}]")
}
