//! cliclack theme with ruby-red accents

use cliclack::ThemeState;
use console::Style;

struct RubyTheme;

fn accent(state: &ThemeState) -> Style {
    match state {
        ThemeState::Active | ThemeState::Submit => Style::new().red(),
        ThemeState::Error(_) => Style::new().red().bold(),
        ThemeState::Cancel => Style::new().dim(),
    }
}

impl cliclack::Theme for RubyTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Submit => accent(state).dim(),
            _ => accent(state),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Submit => Style::new().green(),
            _ => accent(state),
        }
    }
}

/// Install the theme for all cliclack output
pub fn init_theme() {
    cliclack::set_theme(RubyTheme);
}
