use super::*;

#[test]
fn default_deny_grants_only_security_storage() {
    let directives = ConsentDirectives::default_deny();
    let granted: Vec<_> = directives.granted().collect();
    assert_eq!(granted, vec![StoragePurpose::SecurityStorage]);
}

#[test]
fn maps_each_category_to_its_purposes() {
    let directives = ConsentDirectives::from_record(&ConsentRecord::new(false, true, false));
    assert_eq!(
        directives.status(StoragePurpose::AnalyticsStorage),
        ConsentStatus::Granted
    );
    for purpose in [
        StoragePurpose::AdStorage,
        StoragePurpose::AdUserData,
        StoragePurpose::AdPersonalization,
        StoragePurpose::FunctionalityStorage,
        StoragePurpose::PersonalizationStorage,
    ] {
        assert_eq!(directives.status(purpose), ConsentStatus::Denied, "{purpose:?}");
    }
    assert_eq!(
        directives.status(StoragePurpose::SecurityStorage),
        ConsentStatus::Granted
    );
}

#[test]
fn marketing_controls_all_ad_purposes() {
    let directives = ConsentDirectives::from_record(&ConsentRecord::new(false, false, true));
    let granted: Vec<_> = directives.granted().collect();
    assert_eq!(
        granted,
        vec![
            StoragePurpose::AdStorage,
            StoragePurpose::AdUserData,
            StoragePurpose::AdPersonalization,
            StoragePurpose::SecurityStorage,
        ]
    );
}

#[test]
fn security_storage_is_granted_even_when_everything_is_refused() {
    let directives = ConsentDirectives::from_record(&ConsentRecord::necessary_only());
    assert_eq!(directives, ConsentDirectives::default_deny());
}

#[test]
fn wire_object_uses_gtag_names() {
    let wire = ConsentDirectives::from_record(&ConsentRecord::accept_all()).to_wire();
    assert_eq!(wire.len(), 7);
    for purpose in StoragePurpose::ALL {
        assert_eq!(wire[purpose.as_str()], "granted");
    }
}
