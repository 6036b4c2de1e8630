//! Data points the report builder offers for each report type.
//!
//! Ids arrive from the form as snake_case; prompts show the human label.

use crate::blueprint::ReportType;

/// Longest notes string forwarded to the model, in characters.
pub const MAX_NOTES_CHARS: usize = 2000;

const COMPETITOR_ANALYSIS: &[(&str, &str)] = &[
    ("traffic_seo", "Traffic & SEO"),
    ("paid_search", "Paid Search (Google Ads)"),
    ("social_media_traffic", "Social Media Traffic"),
    ("website_analysis", "Website Analysis"),
    ("social_media_presence", "Social Media Presence"),
    ("content_strategy", "Content Strategy"),
    ("social_advertising", "Social Advertising"),
    ("display_advertising", "Display Advertising"),
    ("market_position", "Market Position"),
    ("product_portfolio", "Product Portfolio"),
    ("customer_sentiment", "Customer Sentiment"),
    ("revenue_estimates", "Revenue Estimates"),
    ("funding_history", "Funding History"),
    ("growth_metrics", "Growth Metrics"),
    ("team_hiring", "Team Size & Hiring Trends"),
];

const BUSINESS_PERFORMANCE: &[(&str, &str)] = &[
    ("website_analytics", "Website Analytics"),
    ("sales_performance", "Sales Performance"),
    ("marketing_roi", "Marketing ROI"),
    ("seo_performance", "SEO Performance"),
    ("paid_campaigns", "Paid Campaigns"),
    ("social_media_performance", "Social Media Performance"),
    ("customer_demographics", "Customer Demographics"),
    ("customer_behavior", "Customer Behavior"),
    ("retention_metrics", "Retention Metrics"),
    ("churn_analysis", "Churn Analysis"),
];

const NEW_PARTNERS: &[(&str, &str)] = &[
    ("industry_leaders", "Industry Leaders"),
    ("complementary_services", "Complementary Services"),
    ("geographic_coverage", "Geographic Coverage"),
    ("tech_stack_compatibility", "Technology Stack Compatibility"),
    ("company_profile", "Company Profile"),
    ("partnership_potential", "Partnership Potential"),
    ("contact_information", "Contact Information"),
    ("financial_stability", "Financial Stability"),
    ("cultural_fit", "Cultural Fit"),
    ("legal_compliance", "Legal & Compliance"),
];

const MARKET_TRENDS: &[(&str, &str)] = &[
    ("industry_growth", "Industry Growth"),
    ("consumer_behavior", "Consumer Behavior Shifts"),
    ("technology_trends", "Technology Trends"),
    ("competitive_landscape", "Competitive Landscape"),
    ("regulatory_changes", "Regulatory Changes"),
    ("economic_factors", "Economic Factors"),
    ("sustainability_trends", "Sustainability Trends"),
    ("global_market_dynamics", "Global Market Dynamics"),
    ("innovation_trends", "Innovation Trends"),
    ("customer_expectations", "Customer Expectations"),
];

const PRODUCT_LAUNCH: &[(&str, &str)] = &[
    ("market_analysis", "Market Analysis"),
    ("competitive_analysis", "Competitive Analysis"),
    ("target_audience", "Target Audience"),
    ("pricing_strategy", "Pricing Strategy"),
    ("marketing_strategy", "Marketing Strategy"),
    ("go_to_market", "Go-to-Market Plan"),
    ("product_positioning", "Product Positioning"),
    ("pre_launch_activities", "Pre-Launch Activities"),
    ("launch_metrics", "Launch Metrics"),
    ("risk_mitigation", "Risk Mitigation"),
    ("post_launch", "Post-Launch Strategy"),
];

/// `(id, label)` pairs offered for `report_type`, in form order.
pub fn data_points(report_type: ReportType) -> &'static [(&'static str, &'static str)] {
    match report_type {
        ReportType::CompetitorAnalysis => COMPETITOR_ANALYSIS,
        ReportType::BusinessPerformance => BUSINESS_PERFORMANCE,
        ReportType::NewPartners => NEW_PARTNERS,
        ReportType::MarketTrends => MARKET_TRENDS,
        ReportType::ProductLaunch => PRODUCT_LAUNCH,
    }
}

/// Human label for a data-point id. Unknown ids are humanized:
/// `top_keywords` becomes `Top keywords`.
///
/// ```
/// use report_pipeline::blueprint::ReportType;
/// use report_pipeline::catalog::data_point_label;
///
/// assert_eq!(data_point_label(ReportType::CompetitorAnalysis, "traffic_seo"), "Traffic & SEO");
/// assert_eq!(data_point_label(ReportType::CompetitorAnalysis, "top_keywords"), "Top keywords");
/// ```
pub fn data_point_label(report_type: ReportType, id: &str) -> String {
    let id = id.trim();
    data_points(report_type)
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| humanize(id))
}

fn humanize(id: &str) -> String {
    let spaced = id.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trim notes and cap them at [`MAX_NOTES_CHARS`].
pub fn clamp_notes(notes: &str) -> &str {
    let notes = notes.trim();
    match notes.char_indices().nth(MAX_NOTES_CHARS) {
        Some((cut, _)) => &notes[..cut],
        None => notes,
    }
}
