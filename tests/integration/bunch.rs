//! Worker-bunch integration tests
//!
//! A 2-D buffer sliced row-wise, one row per worker, run on both back ends.

use adaptjob::prelude::*;

const WORKERS: usize = 4;
const WIDTH: usize = 100;

/// Writes `row * WIDTH + column` into its own row of the grid.
struct FillRows {
    rows: NativeArray<u32>,
    row: usize,
}

impl Job for FillRows {
    fn execute(&mut self) {
        for column in 0..self.rows.len() {
            // SAFETY: every partition owns a disjoint row view.
            unsafe { self.rows.set(column, (self.row * WIDTH + column) as u32) };
        }
    }
}

impl BunchJob for FillRows {
    fn slice(
        &self,
        index: usize,
        _workers: usize,
    ) -> adaptjob::Result<Self> {
        Ok(Self {
            rows: self.rows.slice_2d(index, WIDTH)?,
            row: index,
        })
    }
}

fn scheduler(mode: ExecutionMode) -> AdaptiveScheduler {
    AdaptiveScheduler::new(SchedulerConfig {
        num_workers: WORKERS,
        ..SchedulerConfig::with_mode(mode)
    })
    .unwrap()
}

fn fill_grid(mode: ExecutionMode) -> Vec<u32> {
    let scheduler = scheduler(mode);
    let grid = NativeArray::new(WORKERS * WIDTH, 0u32);

    let job = FillRows {
        rows: grid.clone(),
        row: 0,
    };
    let bunch = scheduler.schedule_bunch(job, WORKERS, None).unwrap();
    assert_eq!(bunch.len(), WORKERS);
    bunch.complete();
    assert!(bunch.is_completed());

    grid.into_vec().unwrap()
}

#[test]
fn test_bunch_fills_grid_threaded() {
    let grid = fill_grid(ExecutionMode::Threaded);
    assert!(grid.iter().enumerate().all(|(k, &v)| v as usize == k));
}

#[test]
fn test_bunch_fills_grid_cooperative() {
    let grid = fill_grid(ExecutionMode::Cooperative);
    assert!(grid.iter().enumerate().all(|(k, &v)| v as usize == k));
}

#[test]
fn test_bunch_rows_out_of_range() {
    let scheduler = scheduler(ExecutionMode::Threaded);
    let grid = NativeArray::new(2 * WIDTH, 0u32);

    let job = FillRows {
        rows: grid.clone(),
        row: 0,
    };
    let err = scheduler.schedule_bunch(job, WORKERS, None).unwrap_err();
    assert!(matches!(err, ScheduleError::OutOfRange { .. }));

    // Nothing ran and no partition kept a view alive.
    assert!(grid.is_unique());
    assert!(grid.to_vec().iter().all(|&v| v == 0));
}

#[test]
fn test_pipeline_on_both_modes() {
    for mode in [ExecutionMode::Threaded, ExecutionMode::Cooperative] {
        let scheduler = scheduler(mode);
        let grid = NativeArray::new(WORKERS * WIDTH, 0u32);
        let sums = NativeArray::new(WORKERS, 0u32);

        let fill = FillRows {
            rows: grid.clone(),
            row: 0,
        };
        let bunch = scheduler.schedule_bunch(fill, WORKERS, None).unwrap();

        let (input, output) = (grid.clone(), sums.clone());
        let reduce = scheduler.schedule_for(
            move |row: usize| {
                let total = input
                    .slice_2d(row, WIDTH)
                    .map(|r| r.to_vec().iter().sum::<u32>())
                    .unwrap_or_default();
                // SAFETY: one writer per row index.
                unsafe { output.set(row, total) };
            },
            WORKERS,
            1,
            Some(&bunch.joined()),
        );
        reduce.complete();

        let expected: Vec<u32> = (0..WORKERS as u32)
            .map(|row| (0..WIDTH as u32).map(|c| row * WIDTH as u32 + c).sum())
            .collect();
        assert_eq!(sums.into_vec().unwrap(), expected, "mode {mode}");
    }
}
