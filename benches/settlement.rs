use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use settle_eng::model::{ExpenseRecord, SplitKind};
use settle_eng::split::{Member, equal_split};
use settle_eng::{Amount, calculate_balances, calculate_optimal_payments};

/// Generates expenses for one group.
///
/// Members take turns paying; each expense is split evenly between the payer
/// and the next `split_width - 1` members, so balances stay uneven.
pub struct ExpenseGenerator {
    members: Vec<Member>,
    split_width: usize,
    count: u32,
    next: u32,
}

impl ExpenseGenerator {
    pub fn new(num_members: usize, split_width: usize, count: u32) -> Self {
        let members = (0..num_members)
            .map(|i| Member::new(format!("u{i}"), format!("User {i}")))
            .collect();
        Self {
            members,
            split_width: split_width.min(num_members),
            count,
            next: 0,
        }
    }
}

impl Iterator for ExpenseGenerator {
    type Item = ExpenseRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let n = self.next;
        self.next += 1;

        let payer_idx = n as usize % self.members.len();
        let sharing: Vec<Member> = (0..self.split_width)
            .map(|offset| self.members[(payer_idx + offset) % self.members.len()].clone())
            .collect();
        // 10.00 .. 99.99, varied so cents leftovers show up
        let amount = Amount::from_minor(1_000 + (n as i64 * 7_919) % 9_000);
        let payer = &self.members[payer_idx];

        Some(ExpenseRecord {
            id: format!("e{n}"),
            group_id: "bench".into(),
            expense_number: n + 1,
            payer_id: payer.user_id.clone(),
            payer_name: payer.user_name.clone(),
            amount,
            description: String::new(),
            split_kind: SplitKind::Selected,
            splits: equal_split(amount, &sharing).ok()?,
            created_by: payer.user_id.clone(),
            is_settled: false,
        })
    }
}

fn bench_balances(c: &mut Criterion) {
    let mut group = c.benchmark_group("balances");

    for count in [1_000u32, 10_000, 100_000] {
        let expenses: Vec<_> = ExpenseGenerator::new(20, 5, count).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &expenses, |b, expenses| {
            b.iter(|| black_box(calculate_balances(expenses)));
        });
    }

    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");

    for members in [10usize, 100, 1_000] {
        let expenses: Vec<_> = ExpenseGenerator::new(members, 4, members as u32 * 10).collect();
        let balances = calculate_balances(&expenses).expect("generated amounts stay in range");
        group.bench_with_input(
            BenchmarkId::from_parameter(members),
            &balances,
            |b, balances| {
                b.iter(|| black_box(calculate_optimal_payments(balances)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_balances, bench_plan);
criterion_main!(benches);
