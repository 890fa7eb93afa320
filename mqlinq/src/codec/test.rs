use crate::{
    codec::{ClassMap, Codec, CodecRegistry},
    query::ValueType,
};

fn registry() -> CodecRegistry {
    CodecRegistry::builder()
        .register(
            ClassMap::new("Person")
                .member("Name", "name", ValueType::String)
                .member("Manager", "mgr", ValueType::document("Person"))
                .member("Pets", "pets", ValueType::array(ValueType::document("Pet"))),
        )
        .build()
}

#[test]
fn member_resolves_element_name_and_codec() {
    let registry = registry();
    let person = registry.lookup(&ValueType::document("Person")).unwrap();
    assert_eq!(
        Some(("name".to_string(), Codec::string())),
        registry.member(&person, "Name")
    );
}

#[test]
fn recursive_class_resolves_lazily() {
    let registry = registry();
    let person = registry.lookup(&ValueType::document("Person")).unwrap();
    let (element, manager) = registry.member(&person, "Manager").unwrap();
    assert_eq!("mgr", element);
    assert_eq!(person, manager);
}

#[test]
fn unknown_member_is_unresolved() {
    let registry = registry();
    let person = registry.lookup(&ValueType::document("Person")).unwrap();
    assert_eq!(None, registry.member(&person, "FullName"));
}

#[test]
fn array_of_unregistered_class_has_unknown_item() {
    let registry = registry();
    let person = registry.lookup(&ValueType::document("Person")).unwrap();
    let (_, pets) = registry.member(&person, "Pets").unwrap();
    assert!(pets.is_array());
    assert_eq!(None, pets.item());
}

#[test]
fn unregistered_document_type_has_no_codec() {
    assert_eq!(None, registry().lookup(&ValueType::document("Pet")));
}

#[test]
fn dynamic_members_are_addressed_by_name() {
    assert_eq!(
        Some(("anything".to_string(), Codec::Dynamic)),
        registry().member(&Codec::Dynamic, "anything")
    );
}

#[test]
fn synthesized_members_keep_their_codec() {
    let class_map = ClassMap::synthesized(vec![("Total".to_string(), Codec::int64())]);
    let codec = Codec::Document(class_map.into());
    assert_eq!(
        Some(("Total".to_string(), Codec::int64())),
        registry().member(&codec, "Total")
    );
}
