use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::DbError;
use crate::types::{FromRowValue, RowValues};

/// Column names of a result set plus a case-insensitive index into them.
///
/// Shared by every [`Row`] of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // first column wins when two names differ only by case
            index.entry(fold(name)).or_insert(i);
        }
        Self { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `column`, ignoring case.
    #[must_use]
    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&fold(column)).copied()
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// One result tuple.
///
/// Every accessor goes through the same case-insensitive lookup, so key-style access
/// (`row.get("ID")`, `row["id"]`) and attribute-style access (`row.get_as::<i64>("id")`,
/// `row.decode::<User>()`) always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<RowValues>,
}

impl Row {
    #[must_use]
    pub fn new(columns: Arc<Columns>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    fn lookup(&self, column: &str) -> Option<&RowValues> {
        self.columns
            .position(column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value by column name.
    ///
    /// # Errors
    /// Returns `DbError::ColumnNotFound` if no column matches `column` (ignoring case).
    pub fn get(&self, column: &str) -> Result<&RowValues, DbError> {
        self.lookup(column).ok_or_else(|| DbError::ColumnNotFound {
            column: column.to_owned(),
        })
    }

    /// Get a value by column name, converted to `T`.
    ///
    /// # Errors
    /// Returns `DbError::ColumnNotFound` for a missing column or
    /// `DbError::ConversionError` if the value does not convert to `T`.
    pub fn get_as<T: FromRowValue>(&self, column: &str) -> Result<T, DbError> {
        T::from_row_value(self.get(column)?, column)
    }

    /// Decode the whole row into a struct whose fields are named after the columns.
    ///
    /// Each field name the struct asks for (after any serde renames) is looked up with the
    /// same case-insensitive match as [`Row::get`], so `userId`, `UserId` and `userid` fields
    /// all pick up a column named `USERID`. Non-struct targets such as maps see every
    /// column under its lowercased name.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if the row does not deserialize into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        T::deserialize(RowDeserializer(self))
            .map_err(|e| DbError::ConversionError(format!("row decode error: {e}")))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.lookup(column).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.keys().zip(self.values.iter())
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Panics if the column is absent; use [`Row::get`] to handle that case.
impl Index<&str> for Row {
    type Output = RowValues;

    fn index(&self, column: &str) -> &RowValues {
        match self.get(column) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.items() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn column_json(name: &str, value: &RowValues) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
        .map_err(|e| de::Error::custom(format!("column '{name}' is not representable: {e}")))
}

struct RowDeserializer<'r>(&'r Row);

impl RowDeserializer<'_> {
    fn all_columns(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut object = Map::with_capacity(self.0.len());
        for (name, value) in self.0.items() {
            let key = fold(name);
            if !object.contains_key(&key) {
                object.insert(key, column_json(name, value)?);
            }
        }
        Ok(object)
    }

    fn fields(&self, fields: &[&str]) -> Result<Map<String, Value>, serde_json::Error> {
        let mut object = Map::with_capacity(fields.len());
        for field in fields {
            if let Some(value) = self.0.lookup(field) {
                object.insert((*field).to_owned(), column_json(field, value)?);
            }
        }
        Ok(object)
    }
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        Value::Object(self.all_columns()?).deserialize_any(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Value::Object(self.fields(fields)?).deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn user_row() -> Row {
        let columns = Arc::new(Columns::new(vec![
            "ID".to_string(),
            "Name".to_string(),
            "name".to_string(),
            "score".to_string(),
        ]));
        Row::new(
            columns,
            vec![
                RowValues::Int(123),
                RowValues::Text("alice".into()),
                RowValues::Text("shadowed".into()),
                RowValues::Null,
            ],
        )
    }

    #[derive(Debug, Deserialize)]
    struct User {
        id: i64,
        name: String,
        score: Option<f64>,
    }

    #[test]
    fn key_and_attribute_access_agree_regardless_of_case() {
        let row = user_row();
        for column in ["id", "ID", "Id"] {
            assert_eq!(row.get(column).unwrap(), &RowValues::Int(123));
            assert_eq!(&row[column], &RowValues::Int(123));
            assert_eq!(row.get_as::<i64>(column).unwrap(), 123);
        }
        let user: User = row.decode().unwrap();
        assert_eq!(user.id, *row.get("id").unwrap().as_int().unwrap());
        assert_eq!(user.name, row.get_as::<String>("NAME").unwrap());
        assert_eq!(user.name, "alice");
        assert_eq!(user.score, None);
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Account {
        account_id: i64,
        display_name: String,
        #[serde(rename = "Balance")]
        balance: i64,
    }

    #[test]
    fn renamed_fields_match_columns_ignoring_case() {
        let columns = Arc::new(Columns::new(vec![
            "ACCOUNTID".to_string(),
            "displayName".to_string(),
            "balance".to_string(),
        ]));
        let row = Row::new(
            columns,
            vec![
                RowValues::Int(7),
                RowValues::Text("Ops".into()),
                RowValues::Int(250),
            ],
        );
        let account: Account = row.decode().unwrap();
        assert_eq!(account.account_id, 7);
        assert_eq!(account.display_name, "Ops");
        assert_eq!(account.balance, 250);

        let by_name: HashMap<String, serde_json::Value> = row.decode().unwrap();
        assert_eq!(by_name["displayname"], serde_json::json!("Ops"));
    }

    #[test]
    fn decode_reports_missing_fields() {
        let err = user_row().decode::<Account>().unwrap_err();
        assert!(matches!(err, DbError::ConversionError(ref msg) if msg.contains("accountId")));
    }

    #[test]
    fn missing_column_is_reported() {
        let row = user_row();
        let err = row.get("email").unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound { ref column } if column == "email"));
        assert!(!row.contains("email"));
        assert!(row.contains("SCORE"));
    }

    #[test]
    #[should_panic(expected = "column 'email' not found")]
    fn index_panics_on_missing_column() {
        let row = user_row();
        let _ = &row["email"];
    }

    #[test]
    fn keys_values_items_follow_column_order() {
        let row = user_row();
        assert_eq!(row.keys().collect::<Vec<_>>(), ["ID", "Name", "name", "score"]);
        assert_eq!(row.values().len(), 4);
        let (first_key, first_value) = row.items().next().unwrap();
        assert_eq!(first_key, "ID");
        assert_eq!(first_value, &RowValues::Int(123));
    }

    #[test]
    fn serializes_as_json_object() {
        let columns = Arc::new(Columns::new(vec!["id".into(), "email".into()]));
        let row = Row::new(
            columns,
            vec![RowValues::Int(1), RowValues::Text("a@b.c".into())],
        );
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!({"id": 1, "email": "a@b.c"}));
    }
}
