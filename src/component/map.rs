use ratatui::style::{Color, Style, Stylize};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    text::Line,
    widgets::canvas::{Canvas, Map, MapResolution},
    widgets::{Block, Paragraph},
    Frame,
};

use crate::session::{Coordinates, Poi, PoiCategory, Session};

// Default view when nothing is pinned yet: the whole country.
const COUNTRY_CENTER: (f64, f64) = (30.3753, 69.3451);
const COUNTRY_SPAN: (f64, f64) = (12.0, 16.0);

pub struct MapComponent;

impl MapComponent {
    pub fn new() -> Self {
        MapComponent
    }

    pub fn render(&self, session: &Session, frame: &mut Frame, area: Rect) {
        let legend_height = (session.active_pois().len() as u16 + 3).min(8);
        let vertical = Layout::vertical([Constraint::Min(5), Constraint::Length(legend_height)]);
        let [map_area, legend_area] = vertical.areas(area);

        let viewport = fit_viewport(session.active_pois(), session.location());
        let pois = session.active_pois().to_vec();
        let user = session.location();

        let canvas = Canvas::default()
            .block(Block::bordered().title("Map").gray())
            .x_bounds(viewport.x)
            .y_bounds(viewport.y)
            .paint(move |ctx| {
                ctx.draw(&Map {
                    resolution: MapResolution::High,
                    color: Color::DarkGray,
                });
                for poi in &pois {
                    ctx.print(
                        poi.lng,
                        poi.lat,
                        Line::styled("●", Style::new().fg(category_color(poi.category))),
                    );
                }
                if let Some(Coordinates {
                    latitude,
                    longitude,
                }) = user
                {
                    ctx.print(
                        longitude,
                        latitude,
                        Line::styled("◎", Style::new().fg(Color::LightCyan).bold()),
                    );
                }
            });
        frame.render_widget(canvas, map_area);

        self.render_legend(session, frame, legend_area);
    }

    fn render_legend(&self, session: &Session, frame: &mut Frame, area: Rect) {
        let mut lines = Vec::new();
        if session.is_locating() {
            lines.push(Line::styled(
                "◎ locating...",
                Style::new().fg(Color::DarkGray).italic(),
            ));
        } else if session.location().is_some() {
            lines.push(Line::styled(
                "◎ you are here",
                Style::new().fg(Color::LightCyan),
            ));
        }
        for poi in session.active_pois() {
            lines.push(Line::styled(
                format!("● {} ({})", poi.title, category_label(poi.category)),
                Style::new().fg(category_color(poi.category)),
            ));
        }
        if lines.is_empty() {
            lines.push(Line::styled(
                "ask about a place to see it pinned here",
                Style::new().fg(Color::DarkGray).italic(),
            ));
        }

        let legend = Paragraph::new(lines).block(Block::bordered().title("Pins").gray());
        frame.render_widget(legend, area);
    }
}

pub(crate) struct Viewport {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

/// Picks the visible window the way the original map fits itself: country
/// overview with nothing to show, a tight window around the user or a
/// single pin, a padded bounding box over several pins. The user marker
/// does not stretch the box once pins exist.
pub(crate) fn fit_viewport(pois: &[Poi], user: Option<Coordinates>) -> Viewport {
    match pois {
        [] => match user {
            Some(c) => window(c.latitude, c.longitude, 0.25, 0.25),
            None => window(
                COUNTRY_CENTER.0,
                COUNTRY_CENTER.1,
                COUNTRY_SPAN.0,
                COUNTRY_SPAN.1,
            ),
        },
        [only] => window(only.lat, only.lng, 0.06, 0.06),
        many => {
            let mut lat = (f64::MAX, f64::MIN);
            let mut lng = (f64::MAX, f64::MIN);
            for poi in many {
                lat = (lat.0.min(poi.lat), lat.1.max(poi.lat));
                lng = (lng.0.min(poi.lng), lng.1.max(poi.lng));
            }
            let lat_pad = ((lat.1 - lat.0) * 0.2).max(0.05);
            let lng_pad = ((lng.1 - lng.0) * 0.2).max(0.05);
            Viewport {
                x: [lng.0 - lng_pad, lng.1 + lng_pad],
                y: [lat.0 - lat_pad, lat.1 + lat_pad],
            }
        }
    }
}

fn window(lat: f64, lng: f64, lat_half: f64, lng_half: f64) -> Viewport {
    Viewport {
        x: [lng - lng_half, lng + lng_half],
        y: [lat - lat_half, lat + lat_half],
    }
}

fn category_color(category: PoiCategory) -> Color {
    match category {
        PoiCategory::Police => Color::Blue,
        PoiCategory::Hospital => Color::Red,
        PoiCategory::School => Color::Yellow,
        PoiCategory::Food => Color::LightYellow,
        PoiCategory::Bank => Color::Green,
        PoiCategory::Park => Color::LightGreen,
        PoiCategory::Shop => Color::Magenta,
        PoiCategory::Default => Color::White,
    }
}

fn category_label(category: PoiCategory) -> &'static str {
    match category {
        PoiCategory::Police => "police",
        PoiCategory::Hospital => "hospital",
        PoiCategory::School => "school",
        PoiCategory::Food => "food",
        PoiCategory::Bank => "bank",
        PoiCategory::Park => "park",
        PoiCategory::Shop => "shop",
        PoiCategory::Default => "place",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(lat: f64, lng: f64) -> Poi {
        Poi {
            lat,
            lng,
            title: "p".to_string(),
            category: PoiCategory::Default,
        }
    }

    #[test]
    fn empty_map_shows_the_country() {
        let viewport = fit_viewport(&[], None);
        assert!(viewport.x[0] < COUNTRY_CENTER.1 && COUNTRY_CENTER.1 < viewport.x[1]);
        assert!(viewport.y[0] < COUNTRY_CENTER.0 && COUNTRY_CENTER.0 < viewport.y[1]);
    }

    #[test]
    fn user_fix_alone_zooms_in_on_it() {
        let user = Coordinates {
            latitude: 24.86,
            longitude: 67.0,
        };
        let viewport = fit_viewport(&[], Some(user));
        assert!(viewport.y[1] - viewport.y[0] < 1.0);
        assert!(viewport.x[0] < 67.0 && 67.0 < viewport.x[1]);
    }

    #[test]
    fn several_pins_fit_inside_the_window() {
        let pois = [poi(31.52, 74.35), poi(24.86, 67.0), poi(33.68, 73.04)];
        let viewport = fit_viewport(&pois, None);
        for p in &pois {
            assert!(viewport.x[0] < p.lng && p.lng < viewport.x[1]);
            assert!(viewport.y[0] < p.lat && p.lat < viewport.y[1]);
        }
    }

    #[test]
    fn coincident_pins_still_get_a_window() {
        let pois = [poi(31.5, 74.3), poi(31.5, 74.3)];
        let viewport = fit_viewport(&pois, None);
        assert!(viewport.x[1] - viewport.x[0] > 0.0);
        assert!(viewport.y[1] - viewport.y[0] > 0.0);
    }
}
