//! Output functions for consistent build logs
//!
//! Plain output follows the build-log convention that deploy tooling
//! scrapes: `----->` opens a step and detail lines are indented seven
//! spaces. Warnings get a `###### WARNING:` header.

use super::context::UiContext;
use console::style;

/// Prefix of a step line in plain output
pub const STEP_ARROW: &str = "----->";

/// Indent of detail lines in plain output
pub const DETAIL_INDENT: &str = "       ";

#[derive(Debug, Clone, Copy)]
enum Line {
    Open,
    Close,
    Success,
    Info,
    Warning,
    Remark,
}

fn emit(ctx: &UiContext, line: Line, text: &str) {
    if ctx.use_fancy_output() {
        let shown = match line {
            Line::Open => cliclack::intro(style(text).red().bold()),
            Line::Close => cliclack::outro(style(text).green().bold()),
            Line::Success => cliclack::log::success(text),
            Line::Info => cliclack::log::info(text),
            Line::Warning => cliclack::log::warning(text),
            Line::Remark => cliclack::log::remark(text),
        };
        shown.ok();
        return;
    }

    match line {
        Line::Open | Line::Close => println!("{} {}", STEP_ARROW, text),
        Line::Success | Line::Info => println!("{}{}", DETAIL_INDENT, text),
        Line::Warning => println!("{}", warning_block(text)),
        Line::Remark => println!("{}{}", DETAIL_INDENT, style(text).dim()),
    }
}

pub fn intro(ctx: &UiContext, title: &str) {
    emit(ctx, Line::Open, title);
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    emit(ctx, Line::Close, message);
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    emit(ctx, Line::Success, message);
}

/// Success line with a parenthesized detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    emit(ctx, Line::Success, &format!("{} ({})", message, detail));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    emit(ctx, Line::Info, message);
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    emit(ctx, Line::Warning, message);
}

/// Warning followed by what was done about it, on its own line
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    emit(ctx, Line::Warning, &format!("{}\n{}", message, hint));
}

pub fn remark(ctx: &UiContext, message: &str) {
    emit(ctx, Line::Remark, message);
}

/// Header and indent a possibly multi-line warning
fn warning_block(message: &str) -> String {
    let mut block = String::from("\n###### WARNING:\n");
    for line in message.lines() {
        block.push_str(DETAIL_INDENT);
        block.push_str(line);
        block.push('\n');
    }
    block
}
