use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::BookId;

/// タイトルの最大文字数
pub const TITLE_MAX_CHARS: usize = 200;

/// 書籍レコード。`id` はサーバ採番。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    id: BookId,
    title: String,
    release_year: i32,
}

impl Book {
    pub fn new(id: BookId, title: impl Into<String>, release_year: i32) -> Self {
        Self {
            id,
            title: title.into(),
            release_year,
        }
    }

    /// 採番済みIDとペイロードからレコードを組み立てる。
    pub fn from_payload(id: BookId, payload: BookPayload) -> Self {
        Self {
            id,
            title: payload.title,
            release_year: payload.release_year,
        }
    }

    pub fn id(&self) -> BookId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn release_year(&self) -> i32 {
        self.release_year
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.release_year)
    }
}

/// create / replace のリクエストボディ。`id` は送らない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPayload {
    pub title: String,
    pub release_year: i32,
}

impl BookPayload {
    pub fn new(title: impl Into<String>, release_year: i32) -> Self {
        Self {
            title: title.into(),
            release_year,
        }
    }

    /// 受信JSONを検証してペイロードに変換する。
    ///
    /// フィールドごとのエラーをまとめて返す。`id` など未知のキーは無視する。
    pub fn from_json(value: &Value) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();

        let Some(obj) = value.as_object() else {
            errors.push(
                "non_field_errors",
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type_name(value)
                ),
            );
            return Err(errors);
        };

        let title = match validate_title(obj.get("title")) {
            Ok(t) => Some(t),
            Err(msg) => {
                errors.push("title", msg);
                None
            }
        };

        let release_year = match validate_release_year(obj.get("release_year")) {
            Ok(y) => Some(y),
            Err(msg) => {
                errors.push("release_year", msg);
                None
            }
        };

        match (title, release_year) {
            (Some(title), Some(release_year)) => Ok(Self {
                title,
                release_year,
            }),
            _ => Err(errors),
        }
    }
}

/// フィールド名 → エラーメッセージ列。サーバの400応答ボディそのもの。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";

fn validate_title(value: Option<&Value>) -> Result<String, String> {
    let raw = match value {
        None => return Err(REQUIRED.into()),
        Some(Value::Null) => return Err(NOT_NULL.into()),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => return Err("Not a valid string.".into()),
    };

    if raw.is_empty() {
        return Err("This field may not be blank.".into());
    }
    if raw.chars().count() > TITLE_MAX_CHARS {
        return Err(format!(
            "Ensure this field has no more than {TITLE_MAX_CHARS} characters."
        ));
    }
    Ok(raw)
}

fn validate_release_year(value: Option<&Value>) -> Result<i32, String> {
    const INVALID: &str = "A valid integer is required.";

    let parsed: i128 = match value {
        None => return Err(REQUIRED.into()),
        Some(Value::Null) => return Err(NOT_NULL.into()),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i128::from(i)
            } else if let Some(u) = n.as_u64() {
                i128::from(u)
            } else {
                match n.as_f64() {
                    // 1965.0 は整数として受理、1965.5 は拒否
                    Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => f as i128,
                    _ => return Err(INVALID.into()),
                }
            }
        }
        Some(Value::String(s)) => strip_decimal_zeros(s)
            .trim()
            .parse::<i128>()
            .map_err(|_| INVALID.to_string())?,
        Some(_) => return Err(INVALID.into()),
    };

    if parsed > i128::from(i32::MAX) {
        return Err(format!(
            "Ensure this value is less than or equal to {}.",
            i32::MAX
        ));
    }
    if parsed < i128::from(i32::MIN) {
        return Err(format!(
            "Ensure this value is greater than or equal to {}.",
            i32::MIN
        ));
    }
    Ok(parsed as i32)
}

/// 末尾の `.000` を落とす（"1965.0" → "1965"）。
fn strip_decimal_zeros(s: &str) -> &str {
    let t = s.trim_end();
    match t.rfind('.') {
        Some(pos) if t[pos + 1..].chars().all(|c| c == '0') => &t[..pos],
        _ => s,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
