use super::*;
use crate::field::{Field, FieldType};
use crate::lock::IntrinsicLock;
use tempfile::tempdir;

fn sample_fields() -> Vec<Field> {
    vec![
        Field::new("ID", FieldType::Numeric, 6, 0).unwrap(),
        Field::new("NAME", FieldType::Character, 20, 0).unwrap(),
        Field::new("DOB", FieldType::DateType, 8, 0).unwrap(),
        Field::new("ACTIVE", FieldType::Logical, 1, 0).unwrap(),
        Field::new("NOTES", FieldType::Memo, 10, 0).unwrap(),
    ]
}

#[test]
fn structure_round_trips_through_create_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("customer.dbf");
    {
        let dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
        assert_eq!(dbf.structure().field_count(), 5);
        assert_eq!(dbf.structure().header_length, 32 + 32 * 5 + 1);
        assert_eq!(dbf.structure().record_length, 1 + 6 + 20 + 8 + 1 + 10);
    }

    let reopened = Dbf::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
    assert_eq!(reopened.structure().field_count(), 5);
    assert_eq!(reopened.structure().record_count, 0);
    assert_eq!(reopened.structure().field(0).unwrap().name(), "ID");
    assert_eq!(reopened.structure().field(1).unwrap().name(), "NAME");
    assert!(reopened.is_bof());
}

#[test]
fn append_and_replace_round_trips_every_field_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("customer.dbf");

    let record_number = {
        let mut dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
        let n = dbf.append_blank().unwrap();
        dbf.replace("ID", &FieldValue::Numeric(42.0)).unwrap();
        dbf.replace("NAME", &FieldValue::Character("ADA LOVELACE".to_string())).unwrap();
        dbf.replace("DOB", &FieldValue::DateValue(Date::new(12, 10, 1815))).unwrap();
        dbf.replace("ACTIVE", &FieldValue::Logical(true)).unwrap();
        dbf.replace("NOTES", &FieldValue::Character("first computer programmer".to_string()))
            .unwrap();
        n
    };

    let mut reopened = Dbf::open(&path, Config::default(), IntrinsicLock::new()).unwrap();
    reopened.goto_record(record_number).unwrap();
    assert!(!reopened.is_bof());
    assert!(!reopened.is_eof());
    assert_eq!(reopened.get_value("ID").unwrap().as_f64().unwrap(), 42.0);
    assert_eq!(reopened.get_value("NAME").unwrap().as_str().unwrap(), "ADA LOVELACE");
    assert_eq!(reopened.get_value("DOB").unwrap().as_date().unwrap(), Date::new(12, 10, 1815));
    assert!(reopened.get_value("ACTIVE").unwrap().as_bool().unwrap());
    assert_eq!(reopened.get_value("NOTES").unwrap().as_str().unwrap(), "first computer programmer");
}

#[test]
fn replace_at_bof_or_eof_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.dbf");
    let mut dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
    assert!(dbf.is_bof());
    let err = dbf.replace("ID", &FieldValue::Numeric(1.0)).unwrap_err();
    assert!(matches!(err, DbaseError::InvalidArgument { .. }));

    dbf.append_blank().unwrap();
    dbf.goto_record(RECORD_NUMBER_EOF).unwrap();
    assert!(dbf.is_eof());
    let err = dbf.replace("ID", &FieldValue::Numeric(1.0)).unwrap_err();
    assert!(matches!(err, DbaseError::InvalidArgument { .. }));
}

#[test]
fn delete_and_undelete_toggle_the_flag_idempotently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("deletes.dbf");
    let mut dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
    dbf.append_blank().unwrap();
    assert!(!dbf.is_current_deleted());

    dbf.delete().unwrap();
    assert!(dbf.is_current_deleted());
    dbf.delete().unwrap();
    assert!(dbf.is_current_deleted());

    dbf.undelete().unwrap();
    assert!(!dbf.is_current_deleted());
}

#[test]
fn goto_record_clamps_to_bof_and_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cursor.dbf");
    let mut dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
    dbf.append_blank().unwrap();
    dbf.append_blank().unwrap();

    dbf.goto_record(-5).unwrap();
    assert_eq!(dbf.current_record_number(), RECORD_NUMBER_BOF);

    dbf.goto_record(100).unwrap();
    assert_eq!(dbf.current_record_number(), RECORD_NUMBER_EOF);

    dbf.goto_record(2).unwrap();
    assert_eq!(dbf.current_record_number(), 2);
}

#[test]
fn memo_values_reuse_and_append_blocks_through_the_dbf_column() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("memo.dbf");
    let mut dbf = Dbf::create(&path, sample_fields(), Config::default(), IntrinsicLock::new()).unwrap();
    dbf.append_blank().unwrap();

    dbf.replace("NOTES", &FieldValue::Character("short".to_string())).unwrap();
    assert_eq!(dbf.get_value("NOTES").unwrap().as_str().unwrap(), "short");

    let long_value = "x".repeat(5000);
    dbf.replace("NOTES", &FieldValue::Character(long_value.clone())).unwrap();
    assert_eq!(dbf.get_value("NOTES").unwrap().as_str().unwrap(), long_value);

    let medium_value = "y".repeat(4000);
    dbf.replace("NOTES", &FieldValue::Character(medium_value.clone())).unwrap();
    assert_eq!(dbf.get_value("NOTES").unwrap().as_str().unwrap(), medium_value);
}
