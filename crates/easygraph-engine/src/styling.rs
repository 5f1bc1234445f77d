use easygraph_contracts::chart::{ChartConfiguration, CANVAS_BACKGROUND_KEY};
use serde_json::{json, Map, Value};

pub const DEFAULT_CANVAS_BACKGROUND: &str = "#ffffff";
pub const DEFAULT_LEGEND_COLOR: &str = "#334155";
pub const DEFAULT_TITLE_COLOR: &str = "#0f172a";
pub const DEFAULT_TICK_COLOR: &str = "#64748b";
pub const DEFAULT_GRID_COLOR: &str = "#e2e8f0";
pub const DEFAULT_FONT_FAMILY: &str = "Inter, system-ui, sans-serif";

const AXES: [&str; 2] = ["x", "y"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundMode {
    /// White canvas: default text and grid colours are filled in.
    Default,
    /// The model asked for this background and owns every colour choice.
    Custom(String),
}

pub fn background_mode(config: &ChartConfiguration) -> BackgroundMode {
    match config.background_color() {
        Some(color) if !is_white(color) => BackgroundMode::Custom(color.to_string()),
        _ => BackgroundMode::Default,
    }
}

fn is_white(color: &str) -> bool {
    let lowered = color.to_ascii_lowercase();
    lowered == DEFAULT_CANVAS_BACKGROUND || lowered == "white"
}

/// Options handed to the renderer for `config`. Recomputed on every call.
pub fn render_options(config: &ChartConfiguration) -> Map<String, Value> {
    let mut options = config.options.clone();
    options.insert("responsive".to_string(), Value::Bool(true));
    options.insert("maintainAspectRatio".to_string(), Value::Bool(false));

    let mut plugins = object_or_empty(options.get("plugins"));
    match background_mode(config) {
        BackgroundMode::Custom(color) => {
            plugins.insert(CANVAS_BACKGROUND_KEY.to_string(), Value::String(color));
            options.insert("plugins".to_string(), Value::Object(plugins));
        }
        BackgroundMode::Default => {
            plugins.insert(
                CANVAS_BACKGROUND_KEY.to_string(),
                Value::String(DEFAULT_CANVAS_BACKGROUND.to_string()),
            );

            let mut legend = object_or_empty(plugins.get("legend"));
            let labels = with_defaults(
                json!({
                    "color": DEFAULT_LEGEND_COLOR,
                    "font": { "family": DEFAULT_FONT_FAMILY },
                }),
                legend.get("labels"),
            );
            legend.insert("labels".to_string(), Value::Object(labels));
            plugins.insert("legend".to_string(), Value::Object(legend));

            let title = with_defaults(
                json!({
                    "color": DEFAULT_TITLE_COLOR,
                    "font": { "family": DEFAULT_FONT_FAMILY, "weight": "bold" },
                }),
                plugins.get("title"),
            );
            plugins.insert("title".to_string(), Value::Object(title));
            options.insert("plugins".to_string(), Value::Object(plugins));

            let mut scales = object_or_empty(options.get("scales"));
            for axis in AXES {
                let mut scale = object_or_empty(scales.get(axis));
                let ticks = with_defaults(json!({ "color": DEFAULT_TICK_COLOR }), scale.get("ticks"));
                let grid = with_defaults(json!({ "color": DEFAULT_GRID_COLOR }), scale.get("grid"));
                scale.insert("ticks".to_string(), Value::Object(ticks));
                scale.insert("grid".to_string(), Value::Object(grid));
                scales.insert(axis.to_string(), Value::Object(scale));
            }
            options.insert("scales".to_string(), Value::Object(scales));
        }
    }
    options
}

/// `{type, data, options}` ready to hand to a Chart.js-compatible renderer.
pub fn render_document(config: &ChartConfiguration) -> Value {
    json!({
        "type": config.chart_type.as_str(),
        "data": config.data,
        "options": render_options(config),
    })
}

/// Shallow merge: every key the model set wins over the default.
fn with_defaults(defaults: Value, overrides: Option<&Value>) -> Map<String, Value> {
    let mut merged = defaults.as_object().cloned().unwrap_or_default();
    for (key, value) in object_or_empty(overrides) {
        merged.insert(key, value);
    }
    merged
}

fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
