//! Business partner metadata used by the test suites of this and the
//! dependent crates.

use std::sync::Arc;

use crate::error::CriteriaResult;
use crate::metadata::{
    AssociationPath, Attribute, CollectionAttribute, CollectionElement, EntityType, FieldKind,
    JoinColumn, JoinTable, ServiceDocument, StructuredType,
};

pub const SCHEMA: &str = "OLINGO";

fn address() -> Arc<StructuredType> {
    Arc::new(StructuredType::new(
        "PostalAddressData",
        vec![
            Attribute::simple("streetName", "Address.StreetName", FieldKind::String),
            Attribute::simple("cityName", "Address.CityName", FieldKind::String),
            Attribute::simple("postalCode", "Address.PostalCode", FieldKind::String),
            Attribute::simple("region", "Address.Region", FieldKind::String),
            Attribute::simple("country", "Address.Country", FieldKind::String),
        ],
    ))
}

fn inhouse_address() -> Arc<StructuredType> {
    Arc::new(StructuredType::new(
        "InhouseAddress",
        vec![
            Attribute::simple("taskID", "Task", FieldKind::String),
            Attribute::simple("building", "Building", FieldKind::String),
            Attribute::simple("roomNumber", "RoomNumber", FieldKind::I64),
        ],
    ))
}

fn roles(source: &str) -> AssociationPath {
    AssociationPath::new(
        "Roles",
        source,
        "BusinessPartnerRole",
        vec![JoinColumn::new("ID", "BusinessPartnerID")],
    )
}

fn partner_columns(et: EntityType) -> EntityType {
    et.with_schema(SCHEMA)
        .with_attribute(Attribute::simple("iD", "ID", FieldKind::String))
        .with_attribute(Attribute::simple("eTag", "ETag", FieldKind::I64))
        .with_attribute(Attribute::simple("type", "Type", FieldKind::String))
        .with_attribute(Attribute::simple("country", "Country", FieldKind::String))
        .with_key(["iD"])
}

pub fn business_partner() -> EntityType {
    partner_columns(EntityType::new(
        "BusinessPartner",
        "BusinessPartners",
        "BusinessPartner",
    ))
    .with_attribute(Attribute::complex("address", address()))
    .with_attribute(
        Attribute::simple("customString1", "CustomString1", FieldKind::String).ignored(),
    )
    .with_association(roles("BusinessPartner"))
}

pub fn organization() -> EntityType {
    partner_columns(EntityType::new(
        "Organization",
        "Organizations",
        "BusinessPartner",
    ))
    .with_discriminator("Type", "2")
    .with_attribute(Attribute::simple("name1", "NameLine1", FieldKind::String))
    .with_attribute(Attribute::simple("name2", "NameLine2", FieldKind::String))
    .with_attribute(Attribute::simple("aBCClass", "ABCClass", FieldKind::I64))
    .with_attribute(Attribute::complex("address", address()))
    .with_association(roles("Organization"))
    .with_collection(CollectionAttribute::new(
        "comment",
        CollectionElement::Simple {
            column: "Text".into(),
            kind: FieldKind::String,
        },
        JoinTable {
            schema: Some(SCHEMA.into()),
            table: Some("Comment".into()),
            join_columns: vec![JoinColumn::new("ID", "BusinessPartnerID")],
            entity_type: None,
        },
    ))
}

pub fn person() -> EntityType {
    partner_columns(EntityType::new("Person", "Persons", "BusinessPartner"))
        .with_discriminator("Type", "1")
        .with_attribute(
            Attribute::simple("firstName", "NameLine1", FieldKind::String)
                .with_external_name("FirstName"),
        )
        .with_attribute(
            Attribute::simple("lastName", "NameLine2", FieldKind::String)
                .with_external_name("LastName"),
        )
        .with_association(roles("Person"))
        .with_collection(CollectionAttribute::new(
            "inhouseAddress",
            CollectionElement::Complex(inhouse_address()),
            JoinTable {
                schema: Some(SCHEMA.into()),
                table: Some("InhouseAddress".into()),
                join_columns: vec![JoinColumn::new("ID", "ParentID")],
                entity_type: None,
            },
        ))
}

pub fn business_partner_role() -> EntityType {
    EntityType::new(
        "BusinessPartnerRole",
        "BusinessPartnerRoles",
        "BusinessPartnerRole",
    )
    .with_schema(SCHEMA)
    .with_attribute(Attribute::simple(
        "businessPartnerID",
        "BusinessPartnerID",
        FieldKind::String,
    ))
    .with_attribute(
        Attribute::simple("roleCategory", "BusinessPartnerRole", FieldKind::String)
            .with_external_name("RoleCategory"),
    )
    .with_key(["businessPartnerID", "roleCategory"])
    .with_association(
        AssociationPath::new(
            "Organization",
            "BusinessPartnerRole",
            "Organization",
            vec![JoinColumn::new("BusinessPartnerID", "ID")],
        )
        .single_valued(),
    )
}

pub fn business_partner_protected() -> EntityType {
    EntityType::new(
        "BusinessPartnerProtected",
        "BusinessPartnerProtecteds",
        "BusinessPartnerProtected",
    )
    .with_schema(SCHEMA)
    .with_attribute(Attribute::simple("iD", "ID", FieldKind::String))
    .with_attribute(Attribute::simple("name1", "NameLine1", FieldKind::String))
    .with_attribute(
        Attribute::simple("userName", "UserName", FieldKind::String).protected_by("UserId", true),
    )
    .with_key(["iD"])
}

pub fn administrative_division() -> EntityType {
    let children = AssociationPath::new(
        "Children",
        "AdministrativeDivision",
        "AdministrativeDivision",
        vec![
            JoinColumn::new("CodePublisher", "CodePublisher"),
            JoinColumn::new("CodeID", "ParentCodeID"),
            JoinColumn::new("DivisionCode", "ParentDivisionCode"),
        ],
    );
    let parent = AssociationPath::new(
        "Parent",
        "AdministrativeDivision",
        "AdministrativeDivision",
        vec![
            JoinColumn::new("CodePublisher", "CodePublisher"),
            JoinColumn::new("ParentCodeID", "CodeID"),
            JoinColumn::new("ParentDivisionCode", "DivisionCode"),
        ],
    )
    .single_valued();
    EntityType::new(
        "AdministrativeDivision",
        "AdministrativeDivisions",
        "AdministrativeDivision",
    )
    .with_schema(SCHEMA)
    .with_attribute(Attribute::simple("codePublisher", "CodePublisher", FieldKind::String))
    .with_attribute(Attribute::simple("codeID", "CodeID", FieldKind::String))
    .with_attribute(Attribute::simple("divisionCode", "DivisionCode", FieldKind::String))
    .with_attribute(Attribute::simple("parentCodeID", "ParentCodeID", FieldKind::String))
    .with_attribute(Attribute::simple(
        "parentDivisionCode",
        "ParentDivisionCode",
        FieldKind::String,
    ))
    .with_attribute(Attribute::simple("countryCode", "CountryISOCode", FieldKind::String))
    .with_attribute(Attribute::simple("population", "Population", FieldKind::I64))
    .with_attribute(Attribute::simple("area", "Area", FieldKind::I64))
    .with_key(["codePublisher", "codeID", "divisionCode"])
    .with_association(children)
    .with_association(parent)
}

/// Every fixture entity type in one document.
pub fn service_document() -> CriteriaResult<Arc<ServiceDocument>> {
    ServiceDocument::builder()
        .entity_type(business_partner())
        .entity_type(organization())
        .entity_type(person())
        .entity_type(business_partner_role())
        .entity_type(business_partner_protected())
        .entity_type(administrative_division())
        .build()
}
