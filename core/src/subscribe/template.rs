//! Message templates for subscription fan-out.
//!
//! Placeholders are literal `{name}` tokens. Substitution is a plain string
//! replace: values are never re-scanned, and unknown placeholders are left
//! as written.

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub event: &'a str,
    pub outcome: &'a str,
    pub exit_code: Option<i32>,
    pub command: &'a str,
}

pub fn expand_template(template: &str, vars: &TemplateVars<'_>) -> String {
    let exit_code = vars
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_default();
    let pairs = [
        ("{event}", vars.event),
        ("{outcome}", vars.outcome),
        ("{exit_code}", exit_code.as_str()),
        ("{command}", vars.command),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (token, value) in pairs {
            if tail.starts_with(token) {
                out.push_str(value);
                rest = &tail[token.len()..];
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}
