//! End-to-end conversion tests over the embedded catalog

use std::fs;
use std::path::Path;

use asset_convert::{
    json, wire, AssetType, ConversionPlan, ConversionRequest, ConvertError, Converter, FieldValue,
    Format, Instance, JsonStyle, Message, Schema, SchemaCatalog, TypeRegistry, Value, ValueType,
};
use asset_convert::schema::FieldAccess;
use tempfile::tempdir;

fn catalog() -> &'static SchemaCatalog {
    SchemaCatalog::embedded().expect("embedded catalog loads")
}

fn schema_of(asset_type: AssetType) -> Schema<'static> {
    TypeRegistry::global().schema(asset_type, catalog()).unwrap()
}

/// Sample value for a field type; nested schemas stop at `depth`
fn sample(schema: Schema<'static>, ty: &ValueType, depth: usize) -> Option<Value> {
    let value = match ty {
        ValueType::Bool => Value::Bool(true),
        ValueType::Int32 => Value::I32(-7),
        ValueType::SInt32 | ValueType::SFixed32 => Value::I32(-123_456),
        ValueType::Int64 | ValueType::SInt64 | ValueType::SFixed64 => Value::I64(-9_000_000_000),
        ValueType::UInt32 | ValueType::Fixed32 => Value::U32(4_000_000_000),
        ValueType::UInt64 | ValueType::Fixed64 => Value::U64(u64::MAX - 1),
        ValueType::Float => Value::F32(1.5),
        ValueType::Double => Value::F64(-2.25),
        ValueType::String => Value::String("héllo \"world\"".to_string()),
        ValueType::Bytes => Value::Bytes(vec![0, 1, 254, 255]),
        ValueType::Enum(name) => {
            let descriptor = schema.enumeration(name).unwrap();
            Value::Enum(descriptor.values.last().unwrap().number)
        }
        ValueType::Message(name) => {
            if depth == 0 {
                return None;
            }
            Value::Message(populate(schema.nested(name).unwrap(), depth - 1))
        }
    };
    Some(value)
}

/// Instance with every field set, repeated fields holding two elements
fn populate(schema: Schema<'static>, depth: usize) -> Message {
    let mut message = schema.new_message();
    for (index, field) in schema.fields().iter().enumerate() {
        let Some(first) = sample(schema, &field.ty, depth) else {
            continue;
        };
        if field.is_repeated() {
            let second = sample(schema, &field.ty, depth).unwrap();
            if field.access == FieldAccess::Append {
                message.append(index, first).unwrap();
                message.append(index, second).unwrap();
            } else {
                message
                    .set(index, FieldValue::Repeated(vec![first, second]))
                    .unwrap();
            }
        } else {
            message.set(index, FieldValue::Single(first)).unwrap();
        }
    }
    message
}

fn populated_instance(asset_type: AssetType) -> Instance {
    let schema = schema_of(asset_type);
    if schema.is_blob() {
        Instance::Blob("Lead Designer\n  Someone Somewhere\n".as_bytes().to_vec())
    } else {
        Instance::Message(populate(schema, 2))
    }
}

fn default_instance(asset_type: AssetType) -> Instance {
    let schema = schema_of(asset_type);
    if schema.is_blob() {
        Instance::Blob(Vec::new())
    } else {
        Instance::Message(schema.new_message())
    }
}

/// binary -> JSON -> instance
fn through_both_formats(instance: &Instance, schema: Schema<'_>) -> Instance {
    let binary = wire::encode(instance, schema).unwrap();
    let decoded = wire::decode(&binary, schema).unwrap();
    let text = json::encode(&decoded, schema, JsonStyle::Pretty).unwrap();
    json::decode(&text, schema).unwrap()
}

#[test]
fn test_every_asset_type_roundtrips_across_formats() {
    for asset_type in AssetType::valid_options() {
        let schema = schema_of(asset_type);
        for instance in [default_instance(asset_type), populated_instance(asset_type)] {
            let back = through_both_formats(&instance, schema);
            assert_eq!(back, instance, "{} did not survive binary -> JSON", asset_type);
        }
    }
}

#[test]
fn test_every_asset_type_converts_through_files() {
    let dir = tempdir().unwrap();
    let converter = Converter::new(catalog());
    converter.prewarm().unwrap();

    for asset_type in AssetType::valid_options() {
        let schema = schema_of(asset_type);
        let instance = populated_instance(asset_type);
        let ext = asset_type.handler().unwrap().extension.clone();

        let bytes_path = dir.path().join(format!("sample{}.bytes", ext));
        let json_path = dir.path().join(format!("sample{}.json", ext));
        let back_path = dir.path().join(format!("back{}.bytes", ext));
        fs::write(&bytes_path, wire::encode(&instance, schema).unwrap()).unwrap();

        converter
            .convert(&bytes_path, Format::Bytes, &json_path, Format::Json, asset_type)
            .unwrap();
        converter
            .convert(&json_path, Format::Json, &back_path, Format::Bytes, asset_type)
            .unwrap();

        let back = wire::decode(&fs::read(&back_path).unwrap(), schema).unwrap();
        assert_eq!(back, instance, "{}", asset_type);

        assert!(converter
            .verify_roundtrip(&json_path, Format::Json, asset_type)
            .unwrap()
            .is_empty());
    }
}

#[test]
fn test_absent_fields_are_omitted() {
    let schema = schema_of(AssetType::Item);
    let mut message = schema.new_message();
    message
        .set_by_name("name", FieldValue::Single(Value::String("Sword".into())))
        .unwrap();
    let text = json::encode(&Instance::Message(message), schema, JsonStyle::Compact).unwrap();
    assert_eq!(String::from_utf8(text).unwrap(), "{\"name\":\"Sword\"}\n");
}

#[test]
fn test_extra_property_and_type_mismatch_are_tolerated() {
    let schema = schema_of(AssetType::Item);
    let decoded = json::decode_with_report(
        br#"{"name": "Axe", "cost": "lots", "colour": "red", "weight": 3.5}"#,
        schema,
    )
    .unwrap();

    let message = decoded.instance.as_message().unwrap();
    assert_eq!(
        message.get_by_name("name"),
        Some(&FieldValue::Single(Value::String("Axe".into())))
    );
    assert_eq!(message.get_by_name("weight"), Some(&FieldValue::Single(Value::F32(3.5))));
    assert_eq!(message.get_by_name("cost"), None);

    let paths: Vec<_> = decoded.skipped.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(paths, vec!["cost"]);
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

#[test]
fn test_batch_partial_failure() {
    let dir = tempdir().unwrap();
    let in_dir = dir.path().join("json");
    let out_dir = dir.path().join("bytes");
    fs::create_dir_all(&in_dir).unwrap();
    fs::create_dir_all(&out_dir).unwrap();

    write(&in_dir.join("sword.item.json"), r#"{"name": "Sword", "cost": 10}"#);
    write(&in_dir.join("hero.ch_sht.json"), "{}");
    write(&in_dir.join("broken.item.json"), "not json at all");
    write(&in_dir.join("mystery.json"), "{}");
    write(&in_dir.join("notes.txt"), "ignored");
    write(&in_dir.join("already.item.bytes"), "");

    let converter = Converter::new(catalog());
    let report = converter
        .convert_directory(&in_dir, &out_dir, Some(Format::Json), Format::Bytes)
        .unwrap();

    let converted: Vec<_> = report
        .converted
        .iter()
        .map(|c| c.output.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(converted, vec!["hero.ch_sht.bytes", "sword.item.bytes"]);

    let failed: Vec<_> = report
        .failed
        .iter()
        .map(|f| f.input.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(failed, vec!["broken.item.json", "mystery.json"]);
    assert!(report.has_failures());

    assert_eq!(report.skipped.len(), 2);
    assert!(!out_dir.join("broken.item.bytes").exists());
    assert!(report.to_string().ends_with("2 converted, 2 skipped, 2 failed"));
}

#[test]
fn test_credits_blob_roundtrip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("credits.bytes");
    let output = dir.path().join("credits.json");
    fs::write(&input, "Producer\n  Jane Doe\n").unwrap();

    let request = ConversionRequest {
        input: input.clone(),
        output: output.clone(),
        ..Default::default()
    };
    let plan = request.plan().unwrap();
    assert!(matches!(
        plan,
        ConversionPlan::Single {
            asset_type: AssetType::Credits,
            from: Format::Bytes,
            to: Format::Json,
            ..
        }
    ));
    plan.execute(&Converter::new(catalog())).unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "\"Producer\\n  Jane Doe\\n\"\n");
}

fn plan_error(request: ConversionRequest) -> String {
    match request.plan() {
        Err(ConvertError::Validation(message)) => message,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_contradictory_requests_are_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("sword.item.json");
    write(&input, "{}");
    let sub = dir.path().join("sub");
    fs::create_dir_all(&sub).unwrap();

    let missing = plan_error(ConversionRequest {
        input: dir.path().join("nope.item.json"),
        output: dir.path().join("nope.item.bytes"),
        ..Default::default()
    });
    assert!(missing.contains("not found"));

    let same_format = plan_error(ConversionRequest {
        input: input.clone(),
        output: dir.path().join("copy.item.json"),
        ..Default::default()
    });
    assert!(same_format.contains("formats must be different"));

    let type_mismatch = plan_error(ConversionRequest {
        input: input.clone(),
        output: dir.path().join("sword.pl.bytes"),
        ..Default::default()
    });
    assert!(type_mismatch.contains("asset types must match"));

    let mixed = plan_error(ConversionRequest {
        input: input.clone(),
        output: sub.clone(),
        ..Default::default()
    });
    assert!(mixed.contains("both be directories"));

    let same_place = plan_error(ConversionRequest {
        input: input.clone(),
        output: dir.path().join(".").join("sword.item.json"),
        to_format: Some(Format::Bytes),
        ..Default::default()
    });
    assert!(same_place.contains("same location"));

    let no_parent = plan_error(ConversionRequest {
        input: input.clone(),
        output: dir.path().join("missing").join("sword.item.bytes"),
        ..Default::default()
    });
    assert!(no_parent.contains("output directory not found"));

    let batch_without_format = plan_error(ConversionRequest {
        input: sub.clone(),
        output: dir.path().to_path_buf(),
        ..Default::default()
    });
    assert!(batch_without_format.contains("output format is required"));
}

#[test]
fn test_read_only_output_is_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("sword.item.json");
    let output = dir.path().join("sword.item.bytes");
    write(&input, "{}");
    write(&output, "");
    let mut permissions = fs::metadata(&output).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(&output, permissions).unwrap();

    let message = plan_error(ConversionRequest {
        input,
        output,
        ..Default::default()
    });
    assert!(message.contains("read-only"));
}
