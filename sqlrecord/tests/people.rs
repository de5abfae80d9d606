//! End-to-end tests against SQLite

#![cfg(feature = "sqlite")]

use std::time::Duration;

use sqlrecord::{
    connect, Connection, ConnectionConfig, ConnectionState, DecodeError, Error, FieldDescriptor,
    Filter, QueryError, Record, RecordDescriptor, RowReader, SchemaError, SqlValue, Statement,
    ValueKind,
};

#[derive(Debug, Clone, PartialEq)]
struct Person {
    id: i32,
    name: String,
    age: i32,
    email: String,
}

static PERSON: RecordDescriptor = RecordDescriptor::new(
    "Person",
    &[
        FieldDescriptor::new("id", ValueKind::I32)
            .sql_type("SERIAL")
            .options(&["PRIMARY KEY"])
            .identity(),
        FieldDescriptor::new("name", ValueKind::Text),
        FieldDescriptor::new("age", ValueKind::I32),
        FieldDescriptor::new("email", ValueKind::Text),
    ],
);

impl Record for Person {
    fn descriptor() -> &'static RecordDescriptor {
        &PERSON
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.name.clone().into(),
            self.age.into(),
            self.email.clone().into(),
        ]
    }

    fn from_row(row: &RowReader<'_>) -> Result<Self, DecodeError> {
        Ok(Person {
            id: row.get("id")?,
            name: row.get("name")?,
            age: row.get("age")?,
            email: row.get("email")?,
        })
    }
}

/// Same columns as `Person` but without an identity field
struct Anonymous;

static ANONYMOUS: RecordDescriptor = RecordDescriptor::new(
    "Anonymous",
    &[
        FieldDescriptor::new("name", ValueKind::Text),
        FieldDescriptor::new("age", ValueKind::I32),
    ],
);

impl Record for Anonymous {
    fn descriptor() -> &'static RecordDescriptor {
        &ANONYMOUS
    }

    fn values(&self) -> Vec<SqlValue> {
        Vec::new()
    }

    fn from_row(_row: &RowReader<'_>) -> Result<Self, DecodeError> {
        Ok(Anonymous)
    }
}

fn person(name: &str, age: i32, email: &str) -> Person {
    Person {
        id: 0,
        name: name.to_string(),
        age,
        email: email.to_string(),
    }
}

fn memory() -> Connection {
    connect(ConnectionConfig::sqlite(":memory:")).unwrap()
}

fn populated() -> Connection {
    let mut connection = memory();
    connection.ensure_table::<Person>("people").unwrap();
    for (name, age, email) in [
        ("Jacoby Joukema", 23, "jacoby.joukema@example.com"),
        ("Ashley Jacobs", 28, "ashley.jacobs@example.com"),
        ("John Henry Eden", 97, "john.henry.eden@example.com"),
    ] {
        connection.insert("people", &person(name, age, email)).unwrap();
    }
    connection
}

#[test]
fn test_first_insert_gets_identity_one() {
    let mut connection = memory();
    connection.ensure_table::<Person>("people").unwrap();
    assert_eq!(connection.state(), ConnectionState::Ready);

    let id = connection
        .insert(
            "people",
            &person("Jacoby Joukema", 23, "jacoby.joukema@example.com"),
        )
        .unwrap();
    assert_eq!(id, 1);

    let people: Vec<Person> = connection.select_all("people").unwrap();
    assert_eq!(
        people,
        vec![Person {
            id: 1,
            name: "Jacoby Joukema".to_string(),
            age: 23,
            email: "jacoby.joukema@example.com".to_string(),
        }]
    );
}

#[test]
fn test_returned_identity_selects_the_inserted_row() {
    let mut connection = populated();
    let inserted = person("Miles O'Brien", 41, "obrien@example.com");

    let id = connection.insert("people", &inserted).unwrap();
    let found: Vec<Person> = connection
        .select_where("people", Filter::column("id").eq(id))
        .unwrap();

    assert_eq!(
        found,
        vec![Person {
            id: id as i32,
            ..inserted
        }]
    );
}

#[test]
fn test_operations_under_statement_timeout() {
    let mut connection = memory();
    connection.set_statement_timeout(Some(Duration::from_secs(5)));
    connection.ensure_table::<Person>("people").unwrap();

    let id = connection
        .insert(
            "people",
            &person("Jacoby Joukema", 23, "jacoby.joukema@example.com"),
        )
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(connection.count::<Person>("people", None).unwrap(), 1);
}

#[test]
fn test_select_all_in_identity_order() {
    let mut connection = populated();
    let people: Vec<Person> = connection.select_all("people").unwrap();

    let ids: Vec<i32> = people.iter().map(|person| person.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(people[1].name, "Ashley Jacobs");
}

#[test]
fn test_select_where_raw_filter() {
    let mut connection = populated();
    let boomers: Vec<Person> = connection.select_where("people", "age >= 75").unwrap();

    assert_eq!(boomers.len(), 1);
    assert_eq!(boomers[0].name, "John Henry Eden");
    assert_eq!(boomers[0].age, 97);
}

#[test]
fn test_select_where_structured_filter() {
    let mut connection = populated();

    let young: Vec<Person> = connection
        .select_where(
            "people",
            Filter::and([
                Filter::column("age").lt(30),
                Filter::column("name").like("%Jacob%"),
            ]),
        )
        .unwrap();
    let names: Vec<&str> = young.iter().map(|person| person.name.as_str()).collect();
    assert_eq!(names, vec!["Jacoby Joukema", "Ashley Jacobs"]);

    // Values are bound, never spliced into the SQL text
    connection
        .insert("people", &person("Miles O'Brien", 41, "obrien@example.com"))
        .unwrap();
    let found: Vec<Person> = connection
        .select_where("people", Filter::column("name").eq("Miles O'Brien"))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 4);
}

#[test]
fn test_filter_matching_nothing_is_empty() {
    let mut connection = populated();
    let nobody: Vec<Person> = connection.select_where("people", "age > 200").unwrap();
    assert!(nobody.is_empty());
}

#[test]
fn test_select_on_empty_table() {
    let mut connection = memory();
    connection.ensure_table::<Person>("people").unwrap();
    let people: Vec<Person> = connection.select_all("people").unwrap();
    assert!(people.is_empty());
}

#[test]
fn test_select_by_id_round_trip() {
    let mut connection = populated();
    let original = person("Ashley Jacobs", 28, "ashley.jacobs@example.com");

    let found: Person = connection.select_by_id("people", 2).unwrap().unwrap();
    assert_eq!(found, Person { id: 2, ..original });
    assert!(connection
        .select_by_id::<Person>("people", 99)
        .unwrap()
        .is_none());
}

#[test]
fn test_update_and_count() {
    let mut connection = populated();

    let updated = connection
        .update(
            "people",
            1,
            &person("Jacoby Joukema", 24, "jacoby@example.com"),
        )
        .unwrap();
    assert!(updated);
    assert!(!connection
        .update("people", 42, &person("Nobody", 1, "nobody@example.com"))
        .unwrap());

    let jacoby: Person = connection.select_by_id("people", 1).unwrap().unwrap();
    assert_eq!(jacoby.age, 24);
    assert_eq!(jacoby.email, "jacoby@example.com");

    assert_eq!(connection.count::<Person>("people", None).unwrap(), 3);
    assert_eq!(
        connection
            .count::<Person>("people", Some(Filter::column("age").ge(25)))
            .unwrap(),
        2
    );
}

#[test]
fn test_delete_where() {
    let mut connection = populated();

    let deleted = connection
        .delete_where::<Person>("people", Filter::column("age").lt(30))
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining: Vec<Person> = connection.select_all("people").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 3);
}

#[test]
fn test_ensure_table_is_idempotent() {
    let mut connection = populated();
    connection.ensure_table::<Person>("people").unwrap();
    connection.ensure_table::<Person>("people").unwrap();

    assert_eq!(connection.count::<Person>("people", None).unwrap(), 3);
}

#[test]
fn test_ensure_table_survives_reconnect() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("people.db");
    let config = ConnectionConfig::sqlite(path.to_string_lossy());

    {
        let mut connection = connect(config.clone()).unwrap();
        connection.ensure_table::<Person>("people").unwrap();
        connection
            .insert(
                "people",
                &person("Jacoby Joukema", 23, "jacoby.joukema@example.com"),
            )
            .unwrap();
        connection.close();
    }

    let mut connection = connect(config).unwrap();
    connection.ensure_table::<Person>("people").unwrap();
    let people: Vec<Person> = connection.select_all("people").unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].id, 1);

    let id = connection
        .insert(
            "people",
            &person("Ashley Jacobs", 28, "ashley.jacobs@example.com"),
        )
        .unwrap();
    assert_eq!(id, 2);
}

#[test]
fn test_ensure_table_rejects_different_columns() {
    let mut connection = memory();
    connection
        .execute(&Statement::execute(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, full_name TEXT)",
        ))
        .unwrap();

    match connection.ensure_table::<Person>("people") {
        Err(Error::Schema {
            table,
            source: SchemaError::TableMismatch { found, .. },
        }) => {
            assert_eq!(table, "people");
            assert_eq!(found, vec!["id", "full_name"]);
        }
        other => panic!("expected table mismatch, got {:?}", other),
    }
}

#[test]
fn test_descriptor_without_identity_is_rejected() {
    let mut connection = memory();
    let error = connection.ensure_table::<Anonymous>("anonymous").unwrap_err();
    assert!(matches!(
        error,
        Error::Schema {
            source: SchemaError::MissingIdentity { .. },
            ..
        }
    ));

    // Nothing was created
    let tables = connection
        .execute(
            &Statement::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind("anonymous"),
        )
        .unwrap();
    assert!(tables.is_empty());
}

#[test]
fn test_raw_filter_syntax_error() {
    let mut connection = populated();
    let error = connection
        .select_where::<Person>("people", "age >>> 75")
        .unwrap_err();
    match error {
        Error::Query {
            table,
            statement,
            source: QueryError::Driver(_),
        } => {
            assert_eq!(table.as_deref(), Some("people"));
            assert!(statement.unwrap_or_default().contains("age >>> 75"));
        }
        other => panic!("expected query error, got {:?}", other),
    }

    // The connection stays usable
    assert_eq!(connection.count::<Person>("people", None).unwrap(), 3);
}

#[test]
fn test_close_twice_then_operations_fail() {
    let mut connection = populated();
    connection.close();
    connection.close();
    assert_eq!(connection.state(), ConnectionState::Closed);

    assert!(matches!(
        connection.select_all::<Person>("people"),
        Err(Error::State(_))
    ));
    assert!(matches!(
        connection.ensure_table::<Person>("people"),
        Err(Error::State(_))
    ));
}
