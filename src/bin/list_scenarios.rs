use portfolio_risk::scenarios::canonical_scenarios;

fn main() {
    println!("Canonical stress scenarios:");

    for scenario in canonical_scenarios() {
        println!(
            "{:<16} {:<26} {} .. {}  ({} business days)",
            scenario.id,
            scenario.label,
            scenario.start,
            scenario.end,
            scenario.expected_business_days()
        );
    }
}
