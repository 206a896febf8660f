//! Conversion between structures holding numeric arrays and plain JSON.
//!
//! Arrays are written as nested JSON lists. On the way back every list that
//! is a rectangular nesting of numbers is read as an array, so a plain numeric
//! list does not survive a round trip as a list.

use indexmap::IndexMap;
use serde_json::{Number, Value};

/// Element type of a [`NumericArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int,
    Float,
}

/// Integer elements are kept wide enough for both `i64` and `u64` JSON values.
#[derive(Debug, Clone, PartialEq)]
enum Elements {
    Int(Vec<i128>),
    Float(Vec<f64>),
}

impl Elements {
    fn len(&self) -> usize {
        match self {
            Elements::Int(v) => v.len(),
            Elements::Float(v) => v.len(),
        }
    }

    fn json(&self, index: usize) -> Value {
        match self {
            Elements::Int(v) => int_value(v[index]),
            // NaN and infinities have no JSON form.
            Elements::Float(v) => Number::from_f64(v[index])
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

/// Dense n-dimensional array stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    shape: Vec<usize>,
    elements: Elements,
}

impl NumericArray {
    /// Float array; `None` when `values.len()` does not match the shape.
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Option<Self> {
        Self::shaped(shape, Elements::Float(values))
    }

    /// Integer array; `None` when `values.len()` does not match the shape.
    pub fn new_int(shape: Vec<usize>, values: Vec<i64>) -> Option<Self> {
        Self::shaped(shape, Elements::Int(values.into_iter().map(i128::from).collect()))
    }

    fn shaped(shape: Vec<usize>, elements: Elements) -> Option<Self> {
        if element_count(&shape) != Some(elements.len()) {
            return None;
        }
        Some(Self { shape, elements })
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            elements: Elements::Float(values),
        }
    }

    pub fn from_ints(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            elements: Elements::Int(values.into_iter().map(i128::from).collect()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self.elements {
            Elements::Int(_) => DType::Int,
            Elements::Float(_) => DType::Float,
        }
    }

    /// Row-major values of a float array.
    pub fn as_floats(&self) -> Option<&[f64]> {
        match &self.elements {
            Elements::Float(v) => Some(v),
            Elements::Int(_) => None,
        }
    }

    /// Row-major values of an integer array, covering the `i64` and `u64` ranges.
    pub fn as_ints(&self) -> Option<&[i128]> {
        match &self.elements {
            Elements::Int(v) => Some(v),
            Elements::Float(_) => None,
        }
    }

    /// Read a JSON list as an array if it is rectangular and all numeric.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Self::from_items(items),
            _ => None,
        }
    }

    fn from_items(items: &[Value]) -> Option<Self> {
        // Shape claimed by the first element at each depth; collect_leaves
        // rejects any row that disagrees.
        let mut shape = vec![items.len()];
        let mut first = items.first();
        while let Some(Value::Array(inner)) = first {
            shape.push(inner.len());
            first = inner.first();
        }

        let mut leaves = Vec::new();
        for item in items {
            collect_leaves(item, &shape[1..], &mut leaves)?;
        }

        let all_ints = leaves.iter().all(|n| n.is_i64() || n.is_u64());
        let elements = if all_ints && !leaves.is_empty() {
            Elements::Int(leaves.iter().copied().map(int_of).collect::<Option<_>>()?)
        } else {
            Elements::Float(leaves.iter().map(|n| n.as_f64()).collect::<Option<_>>()?)
        };
        Some(Self { shape, elements })
    }

    /// Nested JSON lists with the array's shape.
    pub fn to_json(&self) -> Value {
        if self.shape.is_empty() {
            if self.is_empty() {
                return Value::Null;
            }
            return self.elements.json(0);
        }
        let mut offset = 0;
        self.nest(0, &mut offset)
    }

    fn nest(&self, axis: usize, offset: &mut usize) -> Value {
        let len = self.shape[axis];
        if axis + 1 == self.shape.len() {
            let row = (*offset..*offset + len).map(|i| self.elements.json(i)).collect();
            *offset += len;
            return Value::Array(row);
        }
        Value::Array((0..len).map(|_| self.nest(axis + 1, offset)).collect())
    }
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

fn int_of(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn int_value(v: i128) -> Value {
    if let Ok(u) = u64::try_from(v) {
        return Value::from(u);
    }
    i64::try_from(v).map(Value::from).unwrap_or(Value::Null)
}

fn collect_leaves<'a>(value: &'a Value, shape: &[usize], out: &mut Vec<&'a Number>) -> Option<()> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) => {
            if items.len() != len {
                return None;
            }
            for item in items {
                collect_leaves(item, rest, out)?;
            }
            Some(())
        }
        (Value::Number(n), None) => {
            out.push(n);
            Some(())
        }
        _ => None,
    }
}

/// A JSON-compatible structure that may hold numeric arrays.
///
/// Maps keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Data>),
    Map(IndexMap<String, Data>),
    Array(NumericArray),
}

impl From<NumericArray> for Data {
    fn from(array: NumericArray) -> Self {
        Data::Array(array)
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        from_json_compatible(value)
    }
}

/// Replace every array with nested lists, producing plain JSON.
pub fn to_json_compatible(data: &Data) -> Value {
    match data {
        Data::Null => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Number(n) => Value::Number(n.clone()),
        Data::String(s) => Value::String(s.clone()),
        Data::List(items) => Value::Array(items.iter().map(to_json_compatible).collect()),
        Data::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json_compatible(v)))
                .collect(),
        ),
        Data::Array(array) => array.to_json(),
    }
}

/// Read plain JSON back, turning numeric lists into arrays.
///
/// Lists that are not rectangular numeric nestings (strings, ragged rows,
/// mixed content) stay lists and are converted element by element.
pub fn from_json_compatible(value: Value) -> Data {
    match value {
        Value::Null => Data::Null,
        Value::Bool(b) => Data::Bool(b),
        Value::Number(n) => Data::Number(n),
        Value::String(s) => Data::String(s),
        Value::Array(items) => match NumericArray::from_items(&items) {
            Some(array) => Data::Array(array),
            None => Data::List(items.into_iter().map(from_json_compatible).collect()),
        },
        Value::Object(map) => Data::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_json_compatible(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matrix_to_nested_lists() {
        let array = NumericArray::new_int(vec![2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(array.to_json(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        assert!(NumericArray::new(vec![2, 2], vec![1.0]).is_none());
        assert!(NumericArray::new(vec![usize::MAX, 2], vec![]).is_none());
    }

    #[test]
    fn test_nested_structure_round_trip() {
        let mut inner = IndexMap::new();
        inner.insert("weights".to_string(), Data::Array(NumericArray::from_vec(vec![0.5, 1.5])));
        inner.insert("label".to_string(), Data::String("run-1".to_string()));

        let mut map = IndexMap::new();
        map.insert("model".to_string(), Data::Map(inner));
        map.insert("epochs".to_string(), Data::Number(12.into()));
        let data = Data::Map(map);

        let encoded = to_json_compatible(&data);
        assert_eq!(
            encoded,
            json!({"model": {"weights": [0.5, 1.5], "label": "run-1"}, "epochs": 12})
        );
        assert_eq!(from_json_compatible(encoded), data);
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let value: Value = serde_json::from_str(r#"{"zeta": 1, "alpha": [1, 2], "mid": {"b": true, "a": null}}"#).unwrap();
        let encoded = to_json_compatible(&from_json_compatible(value));
        assert_eq!(
            serde_json::to_string(&encoded).unwrap(),
            r#"{"zeta":1,"alpha":[1,2],"mid":{"b":true,"a":null}}"#
        );
    }

    #[test]
    fn test_numeric_list_comes_back_as_array() {
        let data = Data::List(vec![Data::Number(1.into()), Data::Number(2.into())]);
        let decoded = from_json_compatible(to_json_compatible(&data));
        assert_eq!(decoded, Data::Array(NumericArray::from_ints(vec![1, 2])));
    }

    #[test]
    fn test_large_integers_are_exact() {
        let original = json!({
            "ids": [9007199254740993i64, 1],
            "big": [18446744073709551615u64],
            "low": [[i64::MIN, 0], [-1, i64::MAX]]
        });
        let decoded = from_json_compatible(original.clone());
        if let Data::Map(map) = &decoded {
            let big = match &map["big"] {
                Data::Array(array) => array,
                other => panic!("expected array, got {:?}", other),
            };
            assert_eq!(big.dtype(), DType::Int);
            assert_eq!(big.as_ints(), Some(&[u64::MAX as i128][..]));
        } else {
            panic!("expected map");
        }
        assert_eq!(to_json_compatible(&decoded), original);
    }

    #[test]
    fn test_mixed_int_float_is_float() {
        let decoded = from_json_compatible(json!([1, 2.5]));
        match decoded {
            Data::Array(array) => {
                assert_eq!(array.dtype(), DType::Float);
                assert_eq!(array.as_floats(), Some(&[1.0, 2.5][..]));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_ragged_and_string_lists_stay_lists() {
        let ragged = from_json_compatible(json!([[1, 2], [3]]));
        assert!(matches!(ragged, Data::List(ref rows) if rows.len() == 2));
        if let Data::List(rows) = ragged {
            assert_eq!(rows[1], Data::Array(NumericArray::from_ints(vec![3])));
        }

        let names = from_json_compatible(json!(["a", "b"]));
        assert_eq!(
            names,
            Data::List(vec![Data::String("a".into()), Data::String("b".into())])
        );
    }

    #[test]
    fn test_ragged_list_with_large_first_row() {
        // The first element claims a 20000 x 20000 x 20000 shape.
        let wide: Vec<Value> = (0..20000).map(Value::from).collect();
        let mut first = vec![Value::Array(wide)];
        first.extend((1..20000).map(Value::from));
        let mut items = vec![Value::Array(first)];
        items.extend((1..20000).map(Value::from));

        let decoded = from_json_compatible(Value::Array(items));
        match decoded {
            Data::List(rows) => {
                assert_eq!(rows.len(), 20000);
                assert!(matches!(rows[0], Data::List(ref inner) if inner.len() == 20000));
                assert_eq!(rows[1], Data::Number(1.into()));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_list_is_empty_float_array() {
        let decoded = from_json_compatible(json!([]));
        assert_eq!(decoded, Data::Array(NumericArray::from_vec(vec![])));
        assert_eq!(to_json_compatible(&decoded), json!([]));
    }

    #[test]
    fn test_nan_encodes_as_null() {
        let data = Data::Array(NumericArray::from_vec(vec![f64::NAN, 1.0]));
        assert_eq!(to_json_compatible(&data), json!([null, 1.0]));
    }
}
