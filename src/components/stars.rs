/// Five-star breakdown of a 0-10 TMDB vote average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stars {
    pub full: u8,
    pub half: bool,
    pub empty: u8,
}

pub fn stars(vote_average: f32) -> Stars {
    let score = if vote_average.is_finite() {
        (vote_average / 2.0).clamp(0.0, 5.0)
    } else {
        0.0
    };
    let full = score.floor() as u8;
    let half = full < 5 && score - f32::from(full) >= 0.5;
    let empty = 5 - full - u8::from(half);
    Stars { full, half, empty }
}

pub fn render_stars(vote_average: f32) -> String {
    let s = stars(vote_average);
    let mut out = format!(
        "<span class=\"stars\" title=\"{:.1}/10\">",
        vote_average.clamp(0.0, 10.0)
    );
    for _ in 0..s.full {
        out.push_str("<span class=\"star full\">\u{2605}</span>");
    }
    if s.half {
        out.push_str("<span class=\"star half\">\u{2BEA}</span>");
    }
    for _ in 0..s.empty {
        out.push_str("<span class=\"star empty\">\u{2606}</span>");
    }
    out.push_str("</span>");
    out
}
