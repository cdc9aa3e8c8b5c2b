use ratatui::style::{Color, Modifier, Style};
use tasklens_core::LineStyle;

pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub highlight: Color,
    pub dimmed: Color,
    pub accent: Color,
    pub header: Color,
    pub error: Color,
    pub warning: Color,
    pub success: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            bg: Color::Black,
            fg: Color::White,
            highlight: Color::Yellow,
            dimmed: Color::DarkGray,
            accent: Color::Cyan,
            header: Color::LightBlue,
            error: Color::Red,
            warning: Color::LightYellow,
            success: Color::LightGreen,
        }
    }
    pub fn light() -> Self {
        Self {
            bg: Color::White,
            fg: Color::Black,
            highlight: Color::Blue,
            dimmed: Color::Gray,
            accent: Color::DarkGray,
            header: Color::Blue,
            error: Color::Red,
            warning: Color::Magenta,
            success: Color::Green,
        }
    }
    pub fn nord() -> Self {
        Self {
            bg: Color::Rgb(46, 52, 64),
            fg: Color::Rgb(216, 222, 233),
            highlight: Color::Rgb(136, 192, 208),
            dimmed: Color::Rgb(76, 86, 106),
            accent: Color::Rgb(129, 161, 193),
            header: Color::Rgb(143, 188, 187),
            error: Color::Rgb(191, 97, 106),
            warning: Color::Rgb(235, 203, 139),
            success: Color::Rgb(163, 190, 140),
        }
    }
    pub fn colorblind() -> Self {
        Self {
            bg: Color::Black,
            fg: Color::White,
            highlight: Color::Yellow,
            dimmed: Color::DarkGray,
            accent: Color::Cyan,
            header: Color::LightBlue,
            error: Color::Rgb(0xFF, 0x8C, 0x00), // orange instead of red
            warning: Color::LightYellow,
            success: Color::Rgb(0x00, 0x80, 0xFF), // blue instead of green
        }
    }
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "nord" => Self::nord(),
            "colorblind" => Self::colorblind(),
            _ => Self::dark(),
        }
    }

    pub fn line_style(&self, style: LineStyle) -> Style {
        let base = Style::default().fg(self.fg);
        match style {
            LineStyle::Normal => base,
            LineStyle::Selected => base.fg(self.highlight).add_modifier(Modifier::REVERSED),
            LineStyle::Dimmed => base.fg(self.dimmed),
            LineStyle::Header => base.fg(self.header).add_modifier(Modifier::BOLD),
            LineStyle::Accent => base.fg(self.accent),
            LineStyle::Warning => base.fg(self.warning),
            LineStyle::Error => base.fg(self.error),
        }
    }
}
