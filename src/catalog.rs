use rand::seq::IndexedRandom;
use rand::Rng;

/// Example questions offered by "Insert random question".
pub const QUESTIONS: [&str; 20] = [
    "List all employees who joined after 2020.",
    "Show all orders shipped to France.",
    "Find the average price of products in the Electronics category.",
    "Get all customers with more than 3 purchases.",
    "Show the total sales for each month in 2024.",
    "Which products have never been ordered?",
    "List the top 10 customers by total purchase amount in the last year.",
    "Show all orders that include more than 3 different products.",
    "Find employees who have not submitted any expense reports in 2023.",
    "Get the monthly active users for each region in 2024.",
    "List all suppliers who delivered late more than twice.",
    "Show the average delivery time for each shipping method.",
    "Find all students who are enrolled in both Math and Science courses.",
    "List the top 5 products with the highest return rate.",
    "Show all invoices that are overdue by more than 30 days.",
    "Get the total number of orders and total revenue per customer.",
    "Find the most common job title among employees in the IT department.",
    "List all projects that have not started yet but have assigned team members.",
    "Show the change in inventory levels for each product over the last 6 months.",
    "Find all customers who have placed orders in every quarter of 2023.",
];

pub fn all() -> &'static [&'static str] {
    &QUESTIONS
}

/// Uniform pick, with replacement.
pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    // The catalog is a non-empty constant.
    QUESTIONS.choose(rng).copied().unwrap_or(QUESTIONS[0])
}
