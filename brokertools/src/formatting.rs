use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};
use work_broker_engine::{
    db_types::{Dispute, ExpertStatistics, Order},
    matcher::RankedCandidate,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

pub fn print_orders(orders: &[Order], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(orders).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")));
        return;
    }
    if orders.is_empty() {
        println!("No orders");
        return;
    }
    let mut table = Table::new();
    table.set_titles(row![
        "ID",
        "Order id",
        "Client",
        "Expert",
        "Subject",
        "Type",
        "Budget",
        "Final price",
        "Status",
        "Deadline",
        "Created At"
    ]);
    orders.iter().for_each(|order| {
        table.add_row(row![
            order.id,
            order.order_id,
            order.client_id,
            order.expert_id.map(|e| format!("#{e}")).unwrap_or_default(),
            order.subject.as_deref().unwrap_or_default(),
            order.work_type.to_string(),
            order.budget.to_string(),
            order.final_price.map(|p| p.to_string()).unwrap_or_default(),
            order.status.to_string(),
            order.deadline.to_string(),
            order.created_at.to_string()
        ]);
    });
    markdown_style(&mut table);
    println!("{table}");
}

pub fn print_candidates(candidates: &[RankedCandidate], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(candidates).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")));
        return;
    }
    if candidates.is_empty() {
        println!("No eligible experts");
        return;
    }
    let mut table = Table::new();
    table.set_titles(row!["Rank", "Expert", "Score", "Rating", "Success rate", "Experience", "Workload"]);
    candidates.iter().enumerate().for_each(|(i, ranked)| {
        let c = &ranked.candidate;
        table.add_row(row![
            i + 1,
            format!("#{}", c.expert_id),
            format!("{:.3}", ranked.relevance_score),
            format!("{:.2}", c.avg_rating),
            format!("{:.1}%", c.success_rate),
            format!("{} years", c.experience_years),
            c.workload
        ]);
    });
    markdown_style(&mut table);
    println!("{table}");
}

pub fn print_dispute(dispute: &Dispute) {
    println!("Dispute #{} on order {}", dispute.id, dispute.order_id);
    println!("Raised by: #{}", dispute.raised_by);
    println!("Reason: {}", dispute.reason);
    match dispute.arbitrator_id {
        Some(arbitrator) => println!("Arbitrator: #{arbitrator}"),
        None => println!("Arbitrator: (unassigned)"),
    }
    if dispute.resolved {
        let outcome = dispute.outcome.map(|o| o.to_string()).unwrap_or_default();
        println!("Resolved: {outcome} ({})", dispute.result_text.as_deref().unwrap_or_default());
    } else {
        println!("Resolved: no");
    }
}

pub fn print_statistics(stats: &ExpertStatistics, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(stats).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")));
        return;
    }
    let mut table = Table::new();
    table.set_titles(row!["Expert", "Orders", "Completed", "Success rate", "Rating", "Earnings", "Avg response"]);
    let response = stats
        .response_time_avg
        .map(|secs| format!("{:.1} h", secs as f64 / 3600.0))
        .unwrap_or_else(|| "-".to_string());
    table.add_row(row![
        format!("#{}", stats.expert_id),
        stats.total_orders,
        stats.completed_orders,
        format!("{:.1}%", stats.success_rate),
        format!("{:.2}", stats.average_rating),
        stats.total_earnings.to_string(),
        response
    ]);
    markdown_style(&mut table);
    println!("{table}");
}
