//! Externally generated technical analysis document.
//!
//! Wire field names are Spanish and kept as is for compatibility with existing analysis
//! providers. Every field is optional and decoded leniently: a malformed optional field or list
//! element is dropped rather than rejecting the whole document.

use crate::de::{de_lenient, de_lenient_f64, de_lenient_vec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct AnnotationDocument {
    #[serde(rename = "analisis_general", default, deserialize_with = "de_lenient")]
    pub general: Option<GeneralAnalysis>,

    #[serde(rename = "puntos_clave_grafico", default, deserialize_with = "de_lenient_vec")]
    pub points: Vec<AnalysisPoint>,

    #[serde(rename = "analisis_fibonacci", default, deserialize_with = "de_lenient")]
    pub fibonacci: Option<FibonacciAnalysis>,

    #[serde(rename = "escenarios_probables", default, deserialize_with = "de_lenient_vec")]
    pub scenarios: Vec<Scenario>,

    #[serde(rename = "conclusion_recomendacion", default, deserialize_with = "de_lenient")]
    pub conclusion: Option<Conclusion>,

    /// Sections not used for drawing (eg/ `liquidez_importante`), retained verbatim.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct GeneralAnalysis {
    #[serde(rename = "simbolo", default, deserialize_with = "de_lenient")]
    pub symbol: Option<SmolStr>,

    #[serde(
        rename = "temporalidad_principal_analisis",
        default,
        deserialize_with = "de_lenient"
    )]
    pub timeframe: Option<SmolStr>,

    #[serde(rename = "sesgo_direccional_general", default, deserialize_with = "de_lenient")]
    pub bias: Option<SmolStr>,

    #[serde(rename = "fecha_analisis", default, deserialize_with = "de_lenient")]
    pub date: Option<String>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Key chart point: a price level, a price zone, and/or a bar marker.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct AnalysisPoint {
    #[serde(rename = "tipo", default)]
    pub kind: PointKind,

    #[serde(rename = "zona", default, deserialize_with = "de_lenient")]
    pub zone: Option<[f64; 2]>,

    #[serde(rename = "nivel", default, deserialize_with = "de_lenient_f64")]
    pub level: Option<f64>,

    #[serde(default, deserialize_with = "de_lenient")]
    pub label: Option<String>,

    #[serde(rename = "descripcion", default, deserialize_with = "de_lenient")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "de_lenient")]
    pub marker_time: Option<i64>,

    #[serde(default, deserialize_with = "de_lenient")]
    pub marker_position: Option<SmolStr>,

    #[serde(default, deserialize_with = "de_lenient")]
    pub marker_shape: Option<SmolStr>,

    #[serde(default, deserialize_with = "de_lenient")]
    pub marker_text: Option<String>,
}

impl AnalysisPoint {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_default()
    }
}

/// Semantic type of an [`AnalysisPoint`].
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(from = "SmolStr", into = "SmolStr")]
pub enum PointKind {
    SupplyPoi,
    DemandPoi,
    SellSideLiquidity,
    BuySideLiquidity,
    BearishFvg,
    BullishFvg,
    BullishBos,
    BearishBos,
    BullishChoch,
    BearishChoch,
    LiquiditySweep,
    Equilibrium,
    WeakHigh,
    WeakLow,
    StrongHigh,
    StrongLow,
    LongEntry,
    ShortEntry,
    StopLoss,
    TakeProfit,
    TradingRange,
    Note,
    BullishWSignal,
    BearishWSignal,
    Other(SmolStr),
}

impl PointKind {
    /// Wire name (eg/ `poi_oferta`).
    pub fn as_str(&self) -> &str {
        match self {
            PointKind::SupplyPoi => "poi_oferta",
            PointKind::DemandPoi => "poi_demanda",
            PointKind::SellSideLiquidity => "liquidez_vendedora",
            PointKind::BuySideLiquidity => "liquidez_compradora",
            PointKind::BearishFvg => "fvg_bajista",
            PointKind::BullishFvg => "fvg_alcista",
            PointKind::BullishBos => "bos_alcista",
            PointKind::BearishBos => "bos_bajista",
            PointKind::BullishChoch => "choch_alcista",
            PointKind::BearishChoch => "choch_bajista",
            PointKind::LiquiditySweep => "sweep_liquidez",
            PointKind::Equilibrium => "equilibrium",
            PointKind::WeakHigh => "weak_high",
            PointKind::WeakLow => "weak_low",
            PointKind::StrongHigh => "strong_high",
            PointKind::StrongLow => "strong_low",
            PointKind::LongEntry => "entrada_largo",
            PointKind::ShortEntry => "entrada_corto",
            PointKind::StopLoss => "stop_loss",
            PointKind::TakeProfit => "take_profit",
            PointKind::TradingRange => "rango_operativo",
            PointKind::Note => "nota_general",
            PointKind::BullishWSignal => "ai_w_signal_bullish",
            PointKind::BearishWSignal => "ai_w_signal_bearish",
            PointKind::Other(other) => other.as_str(),
        }
    }

    fn from_wire(wire: &str) -> Option<Self> {
        let kind = match wire {
            "poi_oferta" => PointKind::SupplyPoi,
            "poi_demanda" => PointKind::DemandPoi,
            "liquidez_vendedora" => PointKind::SellSideLiquidity,
            "liquidez_compradora" => PointKind::BuySideLiquidity,
            "fvg_bajista" => PointKind::BearishFvg,
            "fvg_alcista" => PointKind::BullishFvg,
            "bos_alcista" => PointKind::BullishBos,
            "bos_bajista" => PointKind::BearishBos,
            "choch_alcista" => PointKind::BullishChoch,
            "choch_bajista" => PointKind::BearishChoch,
            "sweep_liquidez" => PointKind::LiquiditySweep,
            "equilibrium" => PointKind::Equilibrium,
            "weak_high" => PointKind::WeakHigh,
            "weak_low" => PointKind::WeakLow,
            "strong_high" => PointKind::StrongHigh,
            "strong_low" => PointKind::StrongLow,
            "entrada_largo" => PointKind::LongEntry,
            "entrada_corto" => PointKind::ShortEntry,
            "stop_loss" => PointKind::StopLoss,
            "take_profit" => PointKind::TakeProfit,
            "rango_operativo" => PointKind::TradingRange,
            "nota_general" => PointKind::Note,
            "ai_w_signal_bullish" => PointKind::BullishWSignal,
            "ai_w_signal_bearish" => PointKind::BearishWSignal,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_fvg(&self) -> bool {
        matches!(self, PointKind::BullishFvg | PointKind::BearishFvg)
    }

    pub fn is_w_signal(&self) -> bool {
        matches!(self, PointKind::BullishWSignal | PointKind::BearishWSignal)
    }
}

impl Default for PointKind {
    fn default() -> Self {
        Self::Other(SmolStr::default())
    }
}

impl From<SmolStr> for PointKind {
    fn from(value: SmolStr) -> Self {
        Self::from_wire(&value.trim().to_ascii_lowercase()).unwrap_or(PointKind::Other(value))
    }
}

impl From<&str> for PointKind {
    fn from(value: &str) -> Self {
        Self::from(SmolStr::new(value))
    }
}

impl From<PointKind> for SmolStr {
    fn from(value: PointKind) -> Self {
        match value {
            PointKind::Other(other) => other,
            known => SmolStr::new(known.as_str()),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct FibonacciAnalysis {
    #[serde(rename = "descripcion_impulso", default, deserialize_with = "de_lenient")]
    pub description: Option<String>,

    #[serde(rename = "precio_inicio_impulso", default, deserialize_with = "de_lenient_f64")]
    pub impulse_start: Option<f64>,

    #[serde(rename = "precio_fin_impulso", default, deserialize_with = "de_lenient_f64")]
    pub impulse_end: Option<f64>,

    #[serde(rename = "precio_fin_retroceso", default, deserialize_with = "de_lenient_f64")]
    pub retracement_end: Option<f64>,

    #[serde(rename = "niveles_retroceso", default, deserialize_with = "de_lenient_vec")]
    pub retracements: Vec<FibonacciLevel>,

    #[serde(rename = "niveles_extension", default, deserialize_with = "de_lenient_vec")]
    pub extensions: Vec<FibonacciLevel>,
}

impl FibonacciAnalysis {
    /// Determine if the impulse moved up. `None` if either end is unknown.
    pub fn impulse_is_up(&self) -> Option<bool> {
        Some(self.impulse_end? > self.impulse_start?)
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct FibonacciLevel {
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub level: Option<f64>,

    #[serde(deserialize_with = "crate::de::de_f64")]
    pub price: f64,

    #[serde(default)]
    pub label: String,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(rename = "nombre_escenario", default, deserialize_with = "de_lenient")]
    pub name: Option<String>,

    #[serde(rename = "probabilidad", default, deserialize_with = "de_lenient")]
    pub probability: Option<SmolStr>,

    #[serde(rename = "descripcion_detallada", default, deserialize_with = "de_lenient")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Conclusion {
    #[serde(rename = "resumen_ejecutivo", default, deserialize_with = "de_lenient")]
    pub summary: Option<String>,

    #[serde(rename = "proximo_movimiento_esperado", default, deserialize_with = "de_lenient")]
    pub next_move: Option<String>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}
