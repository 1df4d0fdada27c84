use proptest::prelude::*;
use stemdeck_core::{
    AssignmentSlot, DragPayload, Stem, StemCollection, StemFilter, StemType, StemView, decimate,
    detect_stem_type,
};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn decimation_always_yields_surface_width(
        samples in prop::collection::vec(-1.0f32..=1.0f32, 0..4096),
        width in 1usize..512usize,
    ) {
        let columns = decimate(&samples, width);
        prop_assert_eq!(columns.len(), width);
        for column in &columns {
            prop_assert!(column.min <= column.max);
            prop_assert!(column.min >= -1.0 && column.max <= 1.0);
        }
    }

    #[test]
    fn decimated_extremes_match_input(
        samples in prop::collection::vec(-1.0f32..=1.0f32, 1..2048),
        width in 1usize..256usize,
    ) {
        let columns = decimate(&samples, width);
        let expected_max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let actual_max = columns.iter().map(|column| column.max).fold(f32::NEG_INFINITY, f32::max);
        let expected_min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let actual_min = columns.iter().map(|column| column.min).fold(f32::INFINITY, f32::min);
        prop_assert!(actual_max >= expected_max);
        prop_assert!(actual_min <= expected_min);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn type_detection_is_total_and_case_insensitive(name in "[ -~]{0,40}") {
        let kind = detect_stem_type(&name);
        prop_assert!(StemType::ALL.contains(&kind));
        prop_assert_eq!(kind, detect_stem_type(&name.to_uppercase()));
    }

    #[test]
    fn drums_keyword_wins_over_later_keywords(prefix in "[a-z_]{0,8}", suffix in "[a-z_]{0,8}") {
        let name = format!("{prefix}vocals_drums{suffix}.wav");
        prop_assert_eq!(detect_stem_type(&name), StemType::Drums);
    }

    #[test]
    fn arbitrary_drop_payloads_never_clobber_assignment(raw in ".{0,128}") {
        let original = Stem::new("bass.wav", "/files/bass.wav");
        let mut slot = AssignmentSlot::default();
        slot.assign(original.clone());

        let expected = DragPayload::parse(&raw).ok();
        let outcome = slot.on_drop(&raw).ok().cloned();
        prop_assert_eq!(&outcome, &expected);
        let held = slot.stem().cloned().expect("slot should stay occupied");
        prop_assert_eq!(held, expected.unwrap_or(original));
    }

    #[test]
    fn filtering_by_all_is_idempotent(
        names in prop::collection::vec("(drum|vocal|bass|synth)[a-z]{0,4}", 0..12),
    ) {
        let collection = StemCollection::deduplicated(
            names
                .iter()
                .map(|name| Stem::new(name.clone(), format!("/files/{name}.wav"))),
        );
        let first = StemView::build(&collection, StemFilter::All, 1);
        let second = StemView::build(&collection, StemFilter::All, 2);
        let stems = |view: &StemView| {
            view.items.iter().map(|item| item.stem.clone()).collect::<Vec<_>>()
        };
        prop_assert_eq!(stems(&first), stems(&second));
        prop_assert_eq!(first.items.len(), collection.len());
    }
}
