/// Plain-text rendering of a board for the terminal client.
use std::fmt::Write;

use tileboard_core::types::Appearance;
use tileboard_core::BoardState;

fn glyph(appearance: &Appearance) -> char {
    match appearance {
        Appearance::Blank => '.',
        Appearance::Wall => '#',
        Appearance::Image { .. } => 'o',
    }
}

/// One line per row, `#` wall, `o` image, `.` blank. Cells whose paint is
/// still unconfirmed are followed by `*`, all others by a space. Palette
/// entries and the current error trail the grid.
pub fn render_text(state: &BoardState) -> String {
    let size = state.size() as usize;
    let mut out = String::new();
    for row in state.render().chunks(size.max(1)) {
        let line: String = row
            .iter()
            .flat_map(|rendered| {
                let pending = if state.overlay(rendered.cell.id).is_some() {
                    '*'
                } else {
                    ' '
                };
                [glyph(&rendered.appearance), pending]
            })
            .collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let panel = state.palette_panel();
    if !panel.is_empty() {
        out.push_str("palette:\n");
        for entry in panel {
            let _ = writeln!(
                out,
                "  {}  {}",
                entry.id,
                entry.name.as_deref().unwrap_or("(unnamed)")
            );
        }
    }
    if let Some(error) = state.error() {
        let _ = writeln!(out, "error: {}", error);
    }
    out
}
