use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::warn;

const IS_OK: &str = "isOk";
const VALUE: &str = "value";
const ERROR: &str = "error";

/// Types that may travel in the success slot of a [`CallResult`].
///
/// `()` is the payload-less case: it serializes without a `value` key and
/// accepts any map that carries `isOk: true`.
pub trait Payload: Serialize + DeserializeOwned + Default + Clone {
    const HAS_VALUE: bool = true;
}

impl Payload for () {
    const HAS_VALUE: bool = false;
}

macro_rules! impl_payload {
    ($($ty:ty),* $(,)?) => { $(impl Payload for $ty {})* };
}

impl_payload!(String, bool, i32, i64, u32, u64, f64, Value);

impl<T: Payload> Payload for Vec<T> {}
impl<T: Payload> Payload for Option<T> {}

/// Success/error container handed back across the plugin boundary.
#[derive(Clone, PartialEq)]
pub struct CallResult<T> {
    inner: Result<T, String>,
}

impl<T> CallResult<T> {
    pub fn ok(value: T) -> Self {
        Self { inner: Ok(value) }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { inner: Err(message.into()) }
    }

    pub fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.inner.is_err()
    }

    /// Error message, empty on the success path.
    pub fn error(&self) -> &str {
        match &self.inner {
            Ok(_) => "",
            Err(message) => message,
        }
    }

    pub fn as_result(&self) -> Result<&T, &str> {
        self.inner.as_ref().map_err(String::as_str)
    }

    pub fn into_result(self) -> Result<T, String> {
        self.inner
    }
}

impl<T: Default + Clone> CallResult<T> {
    /// Success payload, or `T::default()` plus a warning when called on an error.
    pub fn value(&self) -> T {
        match &self.inner {
            Ok(value) => value.clone(),
            Err(message) => {
                warn!("Accessing value on error state: {}", message);
                T::default()
            }
        }
    }
}

impl<T: Payload> CallResult<T> {
    /// Serializes into `{isOk, value?, error?}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(IS_OK.into(), Value::Bool(self.is_ok()));
        match &self.inner {
            Ok(value) if T::HAS_VALUE => {
                // Every `Payload` impl is plain data, so this cannot fail in practice.
                let slot = serde_json::to_value(value).unwrap_or(Value::Null);
                map.insert(VALUE.into(), slot);
            }
            Ok(_) => {}
            Err(message) => {
                map.insert(ERROR.into(), Value::String(message.clone()));
            }
        }
        Value::Object(map)
    }

    /// Rebuilds a result from its structured form.
    ///
    /// Malformed input never panics; it comes back as an `Err` that names
    /// the offending field.
    pub fn from_value(input: &Value) -> Self {
        let Some(map) = input.as_object() else {
            return Self::err("Invalid serialized CallResult: top-level value is not a map");
        };

        let Some(is_ok) = map.get(IS_OK).and_then(Value::as_bool) else {
            return Self::err("Invalid serialized CallResult: missing or non-boolean 'isOk'");
        };

        if !is_ok {
            return match map.get(ERROR) {
                None => Self::err("Invalid serialized CallResult: missing 'error' message"),
                Some(Value::String(message)) => Self::err(message.clone()),
                Some(_) => Self::err("Invalid serialized CallResult: non-string 'error' message"),
            };
        }

        if !T::HAS_VALUE {
            return Self::ok(T::default());
        }

        match map.get(VALUE) {
            None => Self::err("Invalid serialized CallResult: missing 'value' payload"),
            Some(slot) => match serde_json::from_value::<T>(slot.clone()) {
                Ok(value) => Self::ok(value),
                Err(_) => Self::err("Invalid serialized CallResult: 'value' payload type mismatch"),
            },
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for CallResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CallResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Ok(value) => f.debug_tuple("Ok").field(value).finish(),
            Err(message) => f.debug_tuple("Err").field(message).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_and_err_accessors() {
        let ok = CallResult::ok("req-1".to_string());
        assert!(ok.is_ok());
        assert!(!ok.is_err());
        assert_eq!(ok.value(), "req-1");
        assert_eq!(ok.error(), "");

        let err: CallResult<String> = CallResult::err("boom");
        assert!(err.is_err());
        assert_eq!(err.error(), "boom");
    }

    #[test]
    fn value_on_error_falls_back_to_default() {
        let err: CallResult<u64> = CallResult::err("nope");
        assert_eq!(err.value(), 0);
    }

    #[test]
    fn unit_result_has_no_value_slot() {
        let v = CallResult::ok(()).to_value();
        assert_eq!(v, json!({"isOk": true}));
        assert!(CallResult::<()>::from_value(&v).is_ok());
    }

    #[test]
    fn error_form_carries_message() {
        let v = CallResult::<String>::err("send failed").to_value();
        assert_eq!(v, json!({"isOk": false, "error": "send failed"}));
    }

    #[test]
    fn from_value_rejects_non_map() {
        let r = CallResult::<String>::from_value(&json!([1, 2]));
        assert!(r.is_err());
        assert!(r.error().contains("not a map"));
    }

    #[test]
    fn from_value_rejects_missing_or_non_bool_discriminator() {
        let r = CallResult::<String>::from_value(&json!({"value": "x"}));
        assert!(r.error().contains("'isOk'"));
        let r = CallResult::<String>::from_value(&json!({"isOk": "true", "value": "x"}));
        assert!(r.error().contains("'isOk'"));
    }

    #[test]
    fn from_value_rejects_missing_or_mistyped_payload() {
        let r = CallResult::<String>::from_value(&json!({"isOk": true}));
        assert!(r.error().contains("missing 'value'"));
        let r = CallResult::<u64>::from_value(&json!({"isOk": true, "value": "ten"}));
        assert!(r.error().contains("type mismatch"));
    }

    #[test]
    fn from_value_rejects_missing_or_mistyped_error() {
        let r = CallResult::<()>::from_value(&json!({"isOk": false}));
        assert!(r.error().contains("missing 'error'"));
        let r = CallResult::<()>::from_value(&json!({"isOk": false, "error": 7}));
        assert!(r.error().contains("non-string 'error'"));
    }

    #[test]
    fn converts_from_std_result() {
        let r: CallResult<i32> = Err::<i32, _>(std::fmt::Error).into();
        assert!(r.is_err());
        assert_eq!(r.into_result(), Err("an error occurred when formatting an argument".to_string()));
    }
}
