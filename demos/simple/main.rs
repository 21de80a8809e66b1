use std::rc::Rc;

use mvt::{
    poller::{DomPoller, PollState},
    triggers, Experiment, Manifest, MemoryWindow, ProductConfig, RunOutcome, RunnerConfig,
    Variation, Window,
};

pub fn main() {
    env_logger::init();

    // Pass a page URL to try overrides, e.g. `https://example.com/?do=it#mvt=3.1&debug_ab_tests`.
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com/?do=it&code=1234".to_owned());
    let window = Rc::new(MemoryWindow::from_url(&url).unwrap().with_elements("#Submit", 1));

    let manifest = Manifest::from_json(include_str!("../../tests/data/manifest.json")).unwrap();
    let product =
        ProductConfig::from_json(include_str!("../../tests/data/product-config.json")).unwrap();
    let staging = product.environment("staging").unwrap();
    let code = staging.constant("code").unwrap_or_default().to_owned();

    let experiments = vec![
        Experiment::from_manifest(&manifest, "experiment1", triggers::when_query_value("code", &code))
            .unwrap()
            .variation(Variation::new(50.0))
            .variation(Variation::new(50.0).effect(|window, _| {
                let mut poller = DomPoller::new(["#Submit"]);
                if let PollState::Ready(elements) = poller.tick(window) {
                    window.console_log(&format!("decorating {:?}", elements[0][0]));
                }
            })),
        Experiment::from_manifest(&manifest, "experiment3", triggers::immediately())
            .unwrap()
            .variation(Variation::new(1.0))
            .variation(Variation::new(2.0).style("header { background: teal; }")),
        Experiment::new(4, triggers::when_query_value("do", "it"))
            .variation(Variation::new(1.0))
            .variation(Variation::new(1.0).effect(|window, _| {
                window.console_log("Nothing is impossible!");
            })),
    ];

    let runner = RunnerConfig::new().to_runner(window.clone());
    match runner.run(&experiments) {
        RunOutcome::Disabled => println!("Experiments disabled"),
        RunOutcome::Completed { selected } => println!("Selected {selected} variations"),
        RunOutcome::Failed(err) => println!("Run failed: {err}"),
    }

    println!("Tracking: {:?}", window.global("nuk_mvt_tracking"));
    println!("Styles: {:?}", window.styles());
    println!("Console: {:?}", window.console_lines());
}
