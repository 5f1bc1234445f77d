use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const FALLBACK_SUMMARY: &str = "I understood your request but encountered an error formatting the data structure. Please try again or rephrase.";

/// Option key the model sets when the user asks for a non-white canvas.
pub const CANVAS_BACKGROUND_KEY: &str = "customCanvasBackgroundColor";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartType {
    Line,
    #[default]
    Bar,
    Pie,
    Doughnut,
    Radar,
    PolarArea,
    Scatter,
    Bubble,
}

impl ChartType {
    pub const ALL: [ChartType; 8] = [
        ChartType::Line,
        ChartType::Bar,
        ChartType::Pie,
        ChartType::Doughnut,
        ChartType::Radar,
        ChartType::PolarArea,
        ChartType::Scatter,
        ChartType::Bubble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Doughnut => "doughnut",
            ChartType::Radar => "radar",
            ChartType::PolarArea => "polarArea",
            ChartType::Scatter => "scatter",
            ChartType::Bubble => "bubble",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed)
    }
}

/// One series. `data` stays untyped because scatter and bubble charts carry
/// point objects instead of bare numbers; styling keys ride along verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Kept as the model wrote it, `null` and numbers included.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub label: Option<Value>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(flatten)]
    pub styling: Map<String, Value>,
}

impl Dataset {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut styling = obj.clone();
        styling.remove("label");
        styling.remove("data");
        Self {
            label: obj.get("label").cloned(),
            data: obj
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            styling,
        }
    }
}

/// A present key always yields `Some`, even when its value is `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChartData {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return Self::default();
        };
        let labels = obj
            .get("labels")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(label_text).collect())
            .unwrap_or_default();
        let datasets = obj
            .get("datasets")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_object)
                    .map(Dataset::from_object)
                    .collect()
            })
            .unwrap_or_default();
        let mut extra = obj.clone();
        extra.remove("labels");
        extra.remove("datasets");
        Self {
            labels,
            datasets,
            extra,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartConfiguration {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: ChartData,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ChartConfiguration {
    /// Empty bar chart used whenever nothing renderable is available.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lenient shape coercion from an untyped payload. Unknown chart kinds
    /// collapse to `bar`; missing containers become empty.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::empty();
        };
        Self {
            chart_type: obj
                .get("type")
                .and_then(Value::as_str)
                .and_then(ChartType::parse)
                .unwrap_or_default(),
            data: ChartData::from_value(obj.get("data")),
            options: obj
                .get("options")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn background_color(&self) -> Option<&str> {
        self.options
            .get(CANVAS_BACKGROUND_KEY)
            .and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.data.labels.is_empty() && self.data.datasets.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenAIResponse {
    pub chart_config: ChartConfiguration,
    #[serde(default)]
    pub extracted_data: Map<String, Value>,
    #[serde(default)]
    pub user_request: String,
    #[serde(default)]
    pub summary: String,
}

impl GenAIResponse {
    /// Returns `None` unless the payload is a JSON object.
    pub fn from_value(value: &Value, prompt: &str) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            chart_config: obj
                .get("chartConfig")
                .map(ChartConfiguration::from_value)
                .unwrap_or_else(ChartConfiguration::empty),
            extracted_data: obj
                .get("extractedData")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            user_request: obj
                .get("userRequest")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| prompt.to_string()),
            summary: obj
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        })
    }

    pub fn fallback(prompt: &str) -> Self {
        Self {
            chart_config: ChartConfiguration::empty(),
            extracted_data: Map::new(),
            user_request: prompt.to_string(),
            summary: FALLBACK_SUMMARY.to_string(),
        }
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
