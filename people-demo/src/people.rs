use sqlrecord::{
    Connection, DecodeError, FieldDescriptor, Record, RecordDescriptor, RowReader, SqlValue,
    ValueKind,
};

pub const TABLE: &str = "people";

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub email: String,
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

impl Person {
    pub fn new(name: &str, age: i32, email: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            age,
            email: email.to_string(),
        }
    }
}

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

/// Create the people table and optionally seed it with sample rows
pub fn setup(connection: &mut Connection, populate: bool) -> sqlrecord::Result<()> {
    connection.ensure_table::<Person>(TABLE)?;

    if !populate {
        return Ok(());
    }

    let people = [
        Person::new("Jacoby Joukema", 23, "jacoby.joukema@example.com"),
        Person::new("Ashley Jacobs", 28, "ashley.jacobs@example.com"),
        Person::new("John Henry Eden", 97, "john.henry.eden@example.com"),
    ];
    for person in &people {
        let id = connection.insert(TABLE, person)?;
        tracing::info!(id, name = %person.name, "inserted person");
    }

    Ok(())
}
