//! Unit tests for the reference model, identity derivation and formatting.
mod common;
use common::*;
use fukusei::audit::AuditField;
use fukusei::error::{LineageError, Stage};
use fukusei::lineage::lineage_base;
use fukusei::model::embedded::{self, EMBEDDED_PREFIXES};
use fukusei::model::{IdMap, RefShape, RefValue};
use fukusei::prelude::*;
use pretty_assertions::assert_eq;

fn map(pairs: &[(&str, &str)]) -> IdMap {
    pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
}

#[test]
fn test_source_ref_parsing() {
    let tag = SourceRef::parse("formula:F");
    assert_eq!(tag, SourceRef::tagged(SourceKind::Formula, "F"));
    assert_eq!(tag.target(), &id("F"));

    // Only the first colon splits.
    let nested = SourceRef::parse("table:T:col");
    assert_eq!(nested.target(), &id("T:col"));
    assert_eq!(nested.to_string(), "table:T:col");

    let bare = SourceRef::parse("N");
    assert_eq!(bare, SourceRef::Bare(id("N")));
    assert_eq!(bare.to_string(), "N");
}

#[test]
fn test_source_ref_legacy_prefix_is_preserved() {
    let legacy = SourceRef::parse("node-formula:F");
    match &legacy {
        SourceRef::Tagged { kind, id: target } => {
            assert_eq!(kind, &SourceKind::Other("node-formula".to_string()));
            assert_eq!(target, &id("F"));
        }
        other => panic!("expected a tagged source, got {:?}", other),
    }
    assert_eq!(legacy.retarget(id("F-1")).to_string(), "node-formula:F-1");
}

#[test]
fn test_source_ref_serializes_as_plain_string() {
    let json = serde_json::to_string(&SourceRef::parse("select:S")).unwrap();
    assert_eq!(json, "\"select:S\"");
    let back: SourceRef = serde_json::from_str("\"condition:C-1\"").unwrap();
    assert_eq!(back, SourceRef::tagged(SourceKind::Condition, "C-1"));
}

#[test]
fn test_suffix_parsing() {
    assert_eq!("1".parse::<Suffix>().unwrap().segments(), &[1]);
    assert_eq!("1-2".parse::<Suffix>().unwrap().segments(), &[1, 2]);
    assert_eq!("1-2".parse::<Suffix>().unwrap().to_string(), "1-2");
    assert_eq!("".parse::<Suffix>(), Err(LineageError::Empty));
    assert_eq!("0".parse::<Suffix>(), Err(LineageError::ZeroSegment));
    assert_eq!(
        "1-x".parse::<Suffix>(),
        Err(LineageError::InvalidSegment("x".to_string()))
    );
    assert_eq!(
        "+1".parse::<Suffix>(),
        Err(LineageError::InvalidSegment("+1".to_string()))
    );
    assert_eq!(
        "1--2".parse::<Suffix>(),
        Err(LineageError::InvalidSegment(String::new()))
    );
}

#[test]
fn test_derive_is_pure_and_distinct() {
    let x = id("X");
    let one = Suffix::single(1).unwrap();
    let two = Suffix::single(2).unwrap();
    assert_eq!(derive(&x, &one), derive(&x, &one));
    assert_eq!(derive(&x, &one), id("X-1"));
    assert_ne!(derive(&x, &one), derive(&x, &two));
    assert_eq!(derive(&id("X-1"), &two), id("X-1-2"));
    assert_eq!(derive(&x, &"1-2".parse().unwrap()), id("X-1-2"));
}

#[test]
fn test_strip_one_level() {
    assert_eq!(strip_one_level(&id("X-1-2")), Some((id("X-1"), 2)));
    assert_eq!(strip_one_level(&id("X-1")), Some((id("X"), 1)));
    assert_eq!(strip_one_level(&id("X")), None);
    assert_eq!(strip_one_level(&id("node-abc")), None);
    assert_eq!(strip_one_level(&id("X-0")), None);
    assert_eq!(strip_one_level(&id("-3")), None);
    assert_eq!(strip_one_level(&id("X-")), None);
}

#[test]
fn test_lineage_base_follows_provenance() {
    let mut copy = node("X-1", None, 0);
    copy.copied_from_node_id = Some(id("X"));
    copy.copy_suffix = Some(Suffix::single(1).unwrap());
    // Provenance that does not derive the node's own id is ignored.
    let mut stray = node("Y-3", None, 1);
    stray.copied_from_node_id = Some(id("Z"));
    stray.copy_suffix = Some(Suffix::single(3).unwrap());

    let store = MemoryStore::new();
    seed(
        &store,
        vec![
            node("X", None, 2).into(),
            copy.into(),
            stray.into(),
            node("W-4", None, 3).into(),
        ],
    );
    let reader = store.reader().unwrap();
    assert_eq!(lineage_base(reader.as_ref(), &id("X-1")).unwrap(), id("X"));
    assert_eq!(lineage_base(reader.as_ref(), &id("X")).unwrap(), id("X"));
    assert_eq!(lineage_base(reader.as_ref(), &id("Y-3")).unwrap(), id("Y-3"));
    assert_eq!(lineage_base(reader.as_ref(), &id("W-4")).unwrap(), id("W-4"));
    assert_eq!(lineage_base(reader.as_ref(), &id("ghost-1")).unwrap(), id("ghost-1"));
}

#[test]
fn test_embedded_scan() {
    let found = embedded::scan("@value.V1 + node-formula:F_2*formula:F3");
    let refs: Vec<(&str, &str)> = found.iter().map(|r| (r.prefix, r.id)).collect();
    assert_eq!(
        refs,
        vec![("@value.", "V1"), ("node-formula:", "F_2"), ("formula:", "F3")]
    );
    // Glued to an identifier, so not a reference.
    assert!(embedded::scan("myformula:F").is_empty());
    assert!(embedded::scan("plain text").is_empty());
}

#[test]
fn test_embedded_prefixes_longest_first() {
    // A prefix that extends another one must be tried first.
    for (i, earlier) in EMBEDDED_PREFIXES.iter().enumerate() {
        for later in &EMBEDDED_PREFIXES[i + 1..] {
            assert!(
                !later.starts_with(earlier),
                "{} must come before {}",
                later,
                earlier
            );
        }
    }
    let found = embedded::scan("node-condition:C1");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].prefix, "node-condition:");
}

#[test]
fn test_embedded_rewrite_only_touches_mapped_ids() {
    let ids = map(&[("V", "V-1"), ("F", "F-1")]);
    let lookup = |raw: &str| ids.get(raw).map(Id::as_str);

    assert_eq!(
        embedded::rewrite("@value.V * @value.VX + formula:F", lookup),
        Some("@value.V-1 * @value.VX + formula:F-1".to_string())
    );
    assert_eq!(embedded::rewrite("@value.W + 1", lookup), None);
}

#[test]
fn test_reference_field_table_covers_every_kind() {
    for field in ReferenceField::ALL {
        assert!(field.kind().reference_fields().any(|f| f == *field));
    }
    // Every descriptor points back at its owner.
    for kind in EntityKind::descriptors() {
        assert!(
            kind.reference_fields().any(|f| f.name() == "ownerNodeId"),
            "{} has no owner field",
            kind
        );
    }
    assert_eq!(ReferenceField::VariableSource.shape(), RefShape::CompoundTag);
    assert_eq!(ReferenceField::NodeLinkedVariables.shape(), RefShape::IdArray);
    assert_eq!(ReferenceField::SelectTableReference.shape(), RefShape::Direct);
    assert_eq!(ReferenceField::FormulaTokens.shape(), RefShape::Embedded);
    assert_eq!(
        ReferenceField::SelectTableReference.to_string(),
        "selectBinding.tableReference"
    );
}

#[test]
fn test_slot_reads_only_its_own_kind() {
    let record: Record = variable("V", "N", Some("formula:F")).into();
    assert!(record.slot(ReferenceField::FormulaOwner).is_none());
    let slot = record.slot(ReferenceField::VariableSource).unwrap();
    assert_eq!(slot.shape(), RefShape::CompoundTag);
    assert_eq!(slot.to_value(), RefValue::Tag(Some(SourceRef::parse("formula:F"))));
}

#[test]
fn test_ref_value_remap_law() {
    let ids = map(&[("V", "V-1"), ("N", "N-1")]);

    assert_eq!(RefValue::Id(id("N")).remap(&ids), RefValue::Id(id("N-1")));
    assert_eq!(RefValue::Id(id("T")).remap(&ids), RefValue::Id(id("T")));
    assert_eq!(RefValue::OptId(None).remap(&ids), RefValue::OptId(None));
    assert_eq!(
        RefValue::Ids(ids_of(&["T", "V", "X", "N"])).remap(&ids),
        RefValue::Ids(ids_of(&["T", "V-1", "X", "N-1"]))
    );
    assert_eq!(
        RefValue::Tag(Some(SourceRef::parse("field:N"))).remap(&ids),
        RefValue::Tag(Some(SourceRef::parse("field:N-1")))
    );
    assert_eq!(
        RefValue::Tag(Some(SourceRef::parse("N"))).remap(&ids),
        RefValue::Tag(Some(SourceRef::parse("N-1")))
    );
    assert_eq!(
        RefValue::Tag(Some(SourceRef::parse("table:T"))).remap(&ids),
        RefValue::Tag(Some(SourceRef::parse("table:T")))
    );
}

fn ids_of(raw: &[&str]) -> Vec<Id> {
    common::ids(raw)
}

#[test]
fn test_rewriter_redirects_in_place() {
    let ids = map(&[("V", "V-1"), ("N", "N-1"), ("F", "F-1")]);
    let mut record: Record = formula("F-1", "N", &["V", "VX"], &["@value.V", "/", "@value.VX"]).into();

    let redirected = fukusei::duplicator::ReferenceRewriter::new(&ids).rewrite(&mut record);

    assert_eq!(redirected, 3);
    match record {
        Record::Formula(f) => {
            assert_eq!(f.owner_node_id, id("N-1"));
            assert_eq!(f.linked_variable_ids, ids_of(&["V-1", "VX"]));
            assert_eq!(f.tokens, vec!["@value.V-1", "/", "@value.VX"]);
        }
        other => panic!("expected a formula, got {:?}", other),
    }
}

#[test]
fn test_label_suffixing() {
    let mut record: Record = node("N", None, 0).into();
    record.suffix_display_name("1");
    assert_eq!(record.as_node().unwrap().label, "Label N-1");

    let mut unnamed: Record = variable("V", "N", None).into();
    if let Record::Variable(v) = &mut unnamed {
        v.display_name.clear();
    }
    unnamed.suffix_display_name("1");
    if let Record::Variable(v) = &unnamed {
        assert!(v.display_name.is_empty());
    }
}

#[test]
fn test_duplication_mode_parsing() {
    assert_eq!("node".parse::<DuplicationMode>(), Ok(DuplicationMode::Node));
    assert_eq!("subtree".parse::<DuplicationMode>(), Ok(DuplicationMode::Subtree));
    assert!("tree".parse::<DuplicationMode>().is_err());
    assert_eq!(DuplicationMode::default(), DuplicationMode::Subtree);
}

#[test]
fn test_error_stages() {
    let missing = DuplicationError::RootNotFound(id("Z"));
    assert_eq!(missing.stage().to_string(), "closure");
    assert!(!missing.is_transient());

    let conflict = DuplicationError::Transaction {
        stage: Stage::Commit,
        source: StoreError::Conflict("busy".to_string()),
    };
    assert_eq!(conflict.stage().to_string(), "commit");
    assert!(conflict.is_transient());

    let collision = DuplicationError::IdentityCollision {
        kind: EntityKind::Node,
        id: id("N-1"),
    };
    assert_eq!(collision.stage().to_string(), "commit");
    assert!(collision.to_string().contains("N-1"));

    let vanished = DuplicationError::ClosureIntegrity {
        stage: Stage::Cloning,
        kind: EntityKind::Formula,
        id: id("F"),
        reason: "gone".to_string(),
    };
    assert_eq!(vanished.stage(), Stage::Cloning);

    let misplaced = DuplicationError::InvalidTargetParent {
        parent: id("A1"),
        reason: "inside".to_string(),
    };
    assert_eq!(misplaced.stage(), Stage::Closure);

    let exhausted = DuplicationError::Transaction {
        stage: Stage::Closure,
        source: StoreError::CounterExhausted(id("N")),
    };
    assert!(!exhausted.is_transient());
}

#[test]
fn test_options_defaults_and_partial_json() {
    let defaults = DuplicationOptions::default();
    assert!(!defaults.suffix_labels);
    assert!(defaults.verify_after_commit);
    assert!(defaults.retry_transient);

    let partial: DuplicationOptions = serde_json::from_str(r#"{"suffixLabels": true}"#).unwrap();
    assert_eq!(
        partial,
        DuplicationOptions {
            suffix_labels: true,
            ..DuplicationOptions::default()
        }
    );
}

#[test]
fn test_audit_formatter() {
    let warning = ReferenceIntegrityWarning {
        kind: EntityKind::Variable,
        original_id: id("V"),
        field: AuditField::Reference(ReferenceField::VariableSource),
        expected: "formula:F-1".to_string(),
        actual: "formula:F".to_string(),
    };
    assert_eq!(
        AuditFormatter::format_warning(&warning),
        "variable 'V' sourceRef: expected formula:F-1, found formula:F"
    );

    let report = AuditReport {
        root: id("N"),
        suffix: Suffix::single(1).unwrap(),
        mode: DuplicationMode::Subtree,
        checked_objects: 4,
        checked_fields: 9,
        warnings: vec![warning],
    };
    let text = AuditFormatter::format_report(&report);
    assert!(text.contains("'N' (subtree, suffix 1)"));
    assert!(text.contains("1 mismatch(es)"));
}
