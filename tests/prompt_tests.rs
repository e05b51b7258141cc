use specforge::input::{self, InputPaths, InputSet, NO_DEPENDENCIES};
use specforge::prompt::{CompositionMode, Slot, compose};

use proptest::prelude::*;

use test_utils::{Fixture, SAMPLE_SPEC};

// Text without slot markers, spanning several lines
fn free_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :/\\-\\n\\.\"']{0,200}"
}

proptest! {
    #[test]
    fn concatenation_keeps_inputs_whole(
        instruction in free_text(),
        specification in free_text(),
        dependencies in proptest::option::of(free_text()),
    ) {
        let inputs = InputSet::new(specification.clone(), instruction.clone(), dependencies.clone());
        let prompt = compose(&inputs, CompositionMode::Concatenation);

        prop_assert!(prompt.text().contains(&instruction));
        prop_assert!(prompt.text().contains(&specification));
        if let Some(dependencies) = dependencies {
            prop_assert!(prompt.text().contains(&dependencies));
        }
    }

    #[test]
    fn placeholder_replaces_every_spec_slot(
        pieces in proptest::collection::vec(free_text(), 2..6),
        specification in free_text(),
    ) {
        let template = pieces.join("{{SPEC}}");
        let inputs = InputSet::new(specification.clone(), template, None);
        let prompt = compose(&inputs, CompositionMode::Placeholder);

        prop_assert!(!prompt.text().contains("{{SPEC}}"));
        prop_assert_eq!(prompt.text(), pieces.join(&specification));
        prop_assert!(!prompt.missing_slots().contains(&Slot::Spec));
    }
}

#[test]
fn loaded_fixture_composes_with_transformed_dependencies() {
    let fixture = Fixture::new();
    let paths = InputPaths::new(&fixture.spec, &fixture.prompt).with_dependencies(&fixture.deps);
    let inputs = input::load(&paths).expect("inputs should load");

    assert_eq!(inputs.dependencies(), Some("requests==2.31.0\npytest>=7"));

    let prompt = compose(&inputs, CompositionMode::Placeholder);
    assert!(prompt.text().contains(SAMPLE_SPEC));
    assert!(prompt.text().contains("requests==2.31.0\npytest>=7"));
    assert!(!prompt.text().contains("# test runner"));
    assert!(prompt.missing_slots().is_empty());
}

#[test]
fn missing_manifest_falls_back_to_sentinel() {
    let fixture = Fixture::new();
    let paths = InputPaths::new(&fixture.spec, &fixture.prompt)
        .with_dependencies(fixture.dir.path().join("build.gradle"));
    let inputs = input::load(&paths).expect("inputs should load");
    assert_eq!(inputs.dependencies(), None);

    let prompt = compose(&inputs, CompositionMode::Placeholder);
    assert!(prompt.text().contains(NO_DEPENDENCIES));
}

#[test]
fn template_without_slots_is_flagged() {
    let inputs = InputSet::new("spec", "Write tests.", None);
    let prompt = compose(&inputs, CompositionMode::Placeholder);
    assert_eq!(prompt.text(), "Write tests.");
    assert_eq!(prompt.missing_slots(), [Slot::Spec, Slot::Reqs]);
}
