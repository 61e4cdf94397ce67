use self::{
    document::{AnalysisPoint, AnnotationDocument, FibonacciAnalysis, PointKind},
    palette::{
        DEFAULT_SIGNAL_COLOR, FALLBACK_MARKER_COLOR, FVG_OPACITY, LINE_OPACITY, Rgba, Theme,
        fib_extension_color, fib_retracement_color, stroke_color,
    },
};
use crate::{
    normalise::{normalise_symbol, normalise_timeframe},
    subscription::Context,
};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, ToSmolStr};
use tracing::debug;

/// Annotation document model and lenient decoding.
pub mod document;

/// Colours used for overlay primitives.
pub mod palette;

/// User controlled overlay display settings.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OverlaySettings {
    pub show_drawings: bool,
    pub show_signals: bool,
    /// `#RRGGBB` colour of W-signal markers.
    pub signal_color: SmolStr,
    /// W-signal marker opacity in `0..=1`.
    pub signal_opacity: f64,
    pub theme: Theme,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            show_drawings: true,
            show_signals: true,
            signal_color: SmolStr::new_static(DEFAULT_SIGNAL_COLOR),
            signal_opacity: 0.7,
            theme: Theme::default(),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineStyle {
    Solid,
    Dotted,
    Dashed,
    LargeDashed,
}

/// Origin of a [`PriceLine`], so consumers can toggle groups independently.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineGroup {
    Level,
    Zone,
    FibRetracement,
    FibExtension,
}

/// Horizontal guide line drawn across the chart at `price`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct PriceLine {
    pub price: f64,
    pub color: SmolStr,
    pub width: u8,
    pub style: LineStyle,
    pub title: String,
    pub group: LineGroup,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    AboveBar,
    BelowBar,
    InBar,
}

impl MarkerPosition {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "aboveBar" => Some(Self::AboveBar),
            "belowBar" => Some(Self::BelowBar),
            "inBar" => Some(Self::InBar),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
    Circle,
    Square,
}

impl MarkerShape {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "arrowUp" => Some(Self::ArrowUp),
            "arrowDown" => Some(Self::ArrowDown),
            "circle" => Some(Self::Circle),
            "square" => Some(Self::Square),
            _ => None,
        }
    }

    /// Position used when the document does not provide a valid one.
    pub fn default_position(&self) -> MarkerPosition {
        match self {
            MarkerShape::ArrowUp => MarkerPosition::BelowBar,
            MarkerShape::ArrowDown => MarkerPosition::AboveBar,
            MarkerShape::Circle | MarkerShape::Square => MarkerPosition::InBar,
        }
    }
}

/// Marker attached to the bar at `time`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Marker {
    pub time: i64,
    pub position: MarkerPosition,
    pub shape: MarkerShape,
    pub color: SmolStr,
    pub text: String,
}

/// Drawing primitives derived from an [`AnnotationDocument`].
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Overlay {
    pub price_lines: Vec<PriceLine>,
    /// Ordered by time ascending.
    pub markers: Vec<Marker>,
}

impl Overlay {
    pub fn is_empty(&self) -> bool {
        self.price_lines.is_empty() && self.markers.is_empty()
    }
}

/// Determine if the document was produced for the [`Context`]: its symbol and primary timeframe,
/// normalised for the context's source, must match case-insensitively.
pub fn matches_context(document: &AnnotationDocument, context: &Context) -> bool {
    let Some(general) = document.general.as_ref() else {
        return false;
    };
    let (Some(symbol), Some(timeframe)) = (general.symbol.as_ref(), general.timeframe.as_ref())
    else {
        return false;
    };

    normalise_symbol(symbol, context.source).eq_ignore_ascii_case(&context.symbol)
        && normalise_timeframe(timeframe).eq_ignore_ascii_case(context.timeframe.as_str())
}

/// Map an [`AnnotationDocument`] into drawing primitives for the [`Context`].
///
/// Produces an empty [`Overlay`] when drawings are disabled or the document belongs to another
/// context.
pub fn map_overlay(
    document: &AnnotationDocument,
    context: &Context,
    settings: &OverlaySettings,
) -> Overlay {
    if !settings.show_drawings {
        return Overlay::default();
    }

    if !matches_context(document, context) {
        debug!(
            %context,
            document_symbol = ?document.general.as_ref().and_then(|general| general.symbol.as_ref()),
            "annotation document does not match active context"
        );
        return Overlay::default();
    }

    let mut overlay = Overlay::default();

    for point in &document.points {
        overlay.price_lines.extend(point_lines(point));
        if let Some(marker) = point_marker(point, settings) {
            overlay.markers.push(marker);
        }
    }

    if let Some(fibonacci) = document.fibonacci.as_ref() {
        overlay
            .price_lines
            .extend(fibonacci_lines(fibonacci, settings.theme));
    }

    overlay.markers.sort_by_key(|marker| marker.time);
    overlay
}

fn point_lines(point: &AnalysisPoint) -> Vec<PriceLine> {
    if let Some(level) = point.level.filter(|level| level.is_finite()) {
        return vec![PriceLine {
            price: level,
            color: stroke_color(&point.kind, LINE_OPACITY).to_smolstr(),
            width: 1,
            style: LineStyle::Dashed,
            title: point.label().to_string(),
            group: LineGroup::Level,
        }];
    }

    let Some([first, second]) = point.zone.filter(|zone| zone.iter().all(|price| price.is_finite()))
    else {
        return vec![];
    };

    let (color, width, style) = if point.kind.is_fvg() {
        (stroke_color(&point.kind, FVG_OPACITY), 3, LineStyle::Solid)
    } else {
        (stroke_color(&point.kind, LINE_OPACITY), 1, LineStyle::Dotted)
    };
    let color = color.to_smolstr();

    vec![
        PriceLine {
            price: first.max(second),
            color: color.clone(),
            width,
            style,
            title: format!("{} (H)", point.label()),
            group: LineGroup::Zone,
        },
        PriceLine {
            price: first.min(second),
            color,
            width,
            style,
            title: format!("{} (L)", point.label()),
            group: LineGroup::Zone,
        },
    ]
}

fn point_marker(point: &AnalysisPoint, settings: &OverlaySettings) -> Option<Marker> {
    let time = point.marker_time.filter(|time| *time > 0)?;
    let shape = point.marker_shape.as_deref().and_then(MarkerShape::parse)?;
    let position = point
        .marker_position
        .as_deref()
        .and_then(MarkerPosition::parse)
        .unwrap_or_else(|| shape.default_position());

    let (color, default_text) = if point.kind.is_w_signal() {
        if !settings.show_signals {
            return None;
        }
        (signal_color(settings), "W")
    } else {
        (general_marker_color(&point.kind, shape), "")
    };

    Some(Marker {
        time,
        position,
        shape,
        color,
        text: point
            .marker_text
            .clone()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| default_text.to_string()),
    })
}

fn signal_color(settings: &OverlaySettings) -> SmolStr {
    let opacity = if settings.signal_opacity.is_finite() {
        settings.signal_opacity.clamp(0.0, 1.0)
    } else {
        LINE_OPACITY
    };

    Rgba::from_hex(&settings.signal_color, opacity)
        .or_else(|| Rgba::from_hex(DEFAULT_SIGNAL_COLOR, opacity))
        .map(|rgba| rgba.to_smolstr())
        .unwrap_or_else(|| SmolStr::new_static(DEFAULT_SIGNAL_COLOR))
}

fn general_marker_color(kind: &PointKind, shape: MarkerShape) -> SmolStr {
    let rgba = match (kind, shape) {
        (PointKind::LongEntry, _) => Rgba::new(34, 197, 94, LINE_OPACITY),
        (PointKind::ShortEntry, _) => Rgba::new(239, 68, 68, LINE_OPACITY),
        (_, MarkerShape::ArrowUp) => Rgba::new(76, 175, 80, LINE_OPACITY),
        (_, MarkerShape::ArrowDown) => Rgba::new(244, 67, 54, LINE_OPACITY),
        _ => return SmolStr::new_static(FALLBACK_MARKER_COLOR),
    };
    rgba.to_smolstr()
}

fn fibonacci_lines(fibonacci: &FibonacciAnalysis, theme: Theme) -> Vec<PriceLine> {
    let mut retracements = fibonacci
        .retracements
        .iter()
        .filter(|level| level.price.is_finite())
        .collect::<Vec<_>>();

    if fibonacci.impulse_is_up() == Some(true) {
        retracements.sort_by(|a, b| b.price.total_cmp(&a.price));
    } else {
        retracements.sort_by(|a, b| a.price.total_cmp(&b.price));
    }

    let retracement_color = fib_retracement_color(theme).to_smolstr();
    let extension_color = fib_extension_color(theme).to_smolstr();

    let retracement_lines = retracements.into_iter().map(|level| PriceLine {
        price: level.price,
        color: retracement_color.clone(),
        width: 1,
        style: LineStyle::LargeDashed,
        title: level.label.clone(),
        group: LineGroup::FibRetracement,
    });

    let extension_lines = fibonacci
        .extensions
        .iter()
        .filter(|level| level.price.is_finite())
        .map(|level| PriceLine {
            price: level.price,
            color: extension_color.clone(),
            width: 1,
            style: LineStyle::LargeDashed,
            title: format!("Ext: {}", level.label),
            group: LineGroup::FibExtension,
        });

    retracement_lines.chain(extension_lines).collect()
}
