use fieldops_core::{compute_progress, filter_entities, Record, DAY_MILLIS};

const DAY0: i64 = 1_780_000_000_000;

#[test]
fn progress_widget_scenario() {
    let result = compute_progress(Some(DAY0), Some(DAY0 + 10 * DAY_MILLIS), DAY0 + 3 * DAY_MILLIS);
    assert_eq!(result.elapsed_days, 3);
    assert_eq!(result.days_left, 7);
    assert_eq!(result.progress_percentage, 30.0);
}

#[test]
fn progress_is_bounded_over_a_sweep() {
    let start = DAY0 + 5 * 3_600_000;
    for span_hours in [1_i64, 23, 24, 25, 47, 240, 1000] {
        let end = start + span_hours * 3_600_000;
        let mut now = start - 2 * DAY_MILLIS;
        while now <= end + 2 * DAY_MILLIS {
            let r = compute_progress(Some(start), Some(end), now);
            assert!((0.0..=100.0).contains(&r.progress_percentage));
            assert!(r.elapsed_days >= 0 && r.days_left >= 0);
            if now <= start {
                assert_eq!(r.progress_percentage, 0.0);
                assert_eq!(r.elapsed_days, 0);
            }
            now += 3_600_000 * 7;
        }
    }
}

#[test]
fn equipment_search_scenarios() {
    let entities = vec![
        Record::new("location")
            .with("name", "Excavator")
            .with("location", "Site A"),
        Record::new("location")
            .with("name", "Crane")
            .with("location", "Site C"),
    ];

    let hits = filter_entities(&entities, "exc", "All", &["name"]);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity.fields["name"], "Excavator");
    assert_eq!(hits[0].highlighted_fields["name"].to_markup(), "<mark>Exc</mark>avator");

    let site_a = filter_entities(&entities, "", "Site A", &["name"]);
    assert_eq!(site_a.len(), 1);
    assert_eq!(site_a[0].entity.fields["location"], "Site A");
    assert!(site_a[0].highlighted_fields.is_empty());
}
