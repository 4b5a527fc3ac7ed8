//! Runtime values compared by filters.

use std::fmt;

/// Runtime type of a [`FilterValue`], used to pick an operator handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Range,
    /// A host-defined type identified by its tag.
    Custom(&'static str),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => f.write_str("bool"),
            ValueKind::Int => f.write_str("int"),
            ValueKind::Float => f.write_str("float"),
            ValueKind::Text => f.write_str("text"),
            ValueKind::Range => f.write_str("range"),
            ValueKind::Custom(tag) => f.write_str(tag),
        }
    }
}

/// `[min,max]` literal.
///
/// `:`, `=` and `!=` test inclusive containment. The ordering operators
/// compare against the nearer bound: `<` and `<=` against `min`, `>` and
/// `>=` against `max`, so `size<[10,20]` means below the whole range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub min: f64,
    pub max: f64,
}

impl RangeValue {
    /// Parse `[min,max]`. Bounds may come in either order.
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (a, b) = inner.split_once(',')?;
        let a: f64 = a.trim().parse().ok()?;
        let b: f64 = b.trim().parse().ok()?;
        if a.is_nan() || b.is_nan() {
            return None;
        }
        Some(RangeValue {
            min: a.min(b),
            max: a.max(b),
        })
    }
}

/// A value produced by a filter accessor or parsed from a query.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Range(RangeValue),
    /// Host-defined value: a type tag plus its canonical text form.
    Custom { tag: &'static str, text: String },
    /// Several values of one kind; a comparison holds if it holds for any.
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn custom(tag: &'static str, text: impl Into<String>) -> Self {
        FilterValue::Custom {
            tag,
            text: text.into(),
        }
    }

    /// Kind of a scalar value. Lists report the kind of their first element,
    /// or `None` when empty.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            FilterValue::Bool(_) => Some(ValueKind::Bool),
            FilterValue::Int(_) => Some(ValueKind::Int),
            FilterValue::Float(_) => Some(ValueKind::Float),
            FilterValue::Text(_) => Some(ValueKind::Text),
            FilterValue::Range(_) => Some(ValueKind::Range),
            FilterValue::Custom { tag, .. } => Some(ValueKind::Custom(tag)),
            FilterValue::List(items) => items.first().and_then(FilterValue::kind),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Int(i) => Some(*i as f64),
            FilterValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            FilterValue::Custom { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Float(x) => write!(f, "{x}"),
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Range(r) => write!(f, "[{},{}]", r.min, r.max),
            FilterValue::Custom { text, .. } => f.write_str(text),
            FilterValue::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Conversion from accessor return types.
///
/// `value_kind` is the kind the filter declares at registration; it is what
/// query values are type-checked against before evaluation.
pub trait IntoFilterValue {
    fn value_kind() -> ValueKind;
    fn into_filter_value(self) -> FilterValue;
}

macro_rules! impl_into_filter_value {
    ($kind:ident, $variant:ident as $target:ty: $($t:ty),+) => {
        $(
            impl IntoFilterValue for $t {
                fn value_kind() -> ValueKind {
                    ValueKind::$kind
                }

                fn into_filter_value(self) -> FilterValue {
                    FilterValue::$variant(self as $target)
                }
            }
        )+
    };
}

impl_into_filter_value!(Int, Int as i64: i8, i16, i32, i64, u8, u16, u32, usize);
impl_into_filter_value!(Float, Float as f64: f32, f64);

impl IntoFilterValue for bool {
    fn value_kind() -> ValueKind {
        ValueKind::Bool
    }

    fn into_filter_value(self) -> FilterValue {
        FilterValue::Bool(self)
    }
}

impl IntoFilterValue for String {
    fn value_kind() -> ValueKind {
        ValueKind::Text
    }

    fn into_filter_value(self) -> FilterValue {
        FilterValue::Text(self)
    }
}

impl IntoFilterValue for &str {
    fn value_kind() -> ValueKind {
        ValueKind::Text
    }

    fn into_filter_value(self) -> FilterValue {
        FilterValue::Text(self.to_string())
    }
}

impl<V: IntoFilterValue> IntoFilterValue for Vec<V> {
    fn value_kind() -> ValueKind {
        V::value_kind()
    }

    fn into_filter_value(self) -> FilterValue {
        FilterValue::List(self.into_iter().map(IntoFilterValue::into_filter_value).collect())
    }
}

impl<V: IntoFilterValue> IntoFilterValue for Option<V> {
    fn value_kind() -> ValueKind {
        V::value_kind()
    }

    fn into_filter_value(self) -> FilterValue {
        match self {
            Some(v) => v.into_filter_value(),
            None => FilterValue::List(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parse() {
        assert_eq!(
            RangeValue::parse("[1, 5]"),
            Some(RangeValue { min: 1.0, max: 5.0 })
        );
        assert_eq!(
            RangeValue::parse("[5,1]"),
            Some(RangeValue { min: 1.0, max: 5.0 })
        );
        assert_eq!(RangeValue::parse("[1]"), None);
        assert_eq!(RangeValue::parse("1,5"), None);
    }

    #[test]
    fn test_into_filter_value() {
        assert_eq!(42u32.into_filter_value(), FilterValue::Int(42));
        assert_eq!(<f32 as IntoFilterValue>::value_kind(), ValueKind::Float);
        assert_eq!(
            vec!["a", "b"].into_filter_value(),
            FilterValue::List(vec![
                FilterValue::Text("a".into()),
                FilterValue::Text("b".into())
            ])
        );
        assert_eq!(<Vec<String> as IntoFilterValue>::value_kind(), ValueKind::Text);
        assert_eq!(None::<i32>.into_filter_value(), FilterValue::List(Vec::new()));
    }
}
