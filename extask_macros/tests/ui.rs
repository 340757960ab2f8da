#[test]
fn ui() {
    let t = trybuild::TestCases::new();

    // Default and overridden names, generic types
    t.pass("tests/ui/object_type_valid.rs");
}
