//! Composes a run of `Skip`/`Take` operators into a single skip and limit.

/// Paging to emit once a run of paging operators ends.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Paging {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct SkipLimitReducer {
    skip: u64,
    limit: Option<u64>,
}

impl SkipLimitReducer {
    pub fn skip(self, count: u64) -> Self {
        match self.limit {
            // skipping past the end of the window leaves nothing
            Some(limit) if count >= limit => SkipLimitReducer {
                skip: self.skip.saturating_add(limit),
                limit: Some(0),
            },
            Some(limit) => SkipLimitReducer {
                skip: self.skip.saturating_add(count),
                limit: Some(limit - count),
            },
            None => SkipLimitReducer {
                skip: self.skip.saturating_add(count),
                limit: None,
            },
        }
    }

    pub fn take(self, count: u64) -> Self {
        SkipLimitReducer {
            skip: self.skip,
            limit: Some(self.limit.map_or(count, |limit| limit.min(count))),
        }
    }

    /// Whether any paging is pending.
    pub fn is_pending(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }

    /// Whether the window is known to contain no rows.
    pub fn is_empty(&self) -> bool {
        self.limit == Some(0)
    }

    pub fn finish(self) -> Paging {
        if self.is_empty() {
            return Paging {
                skip: Some(0),
                limit: Some(0),
            };
        }
        Paging {
            skip: (self.skip > 0).then_some(self.skip),
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Paging, SkipLimitReducer};

    macro_rules! test_paging {
        ($func_name:ident, expected = ($skip:expr, $limit:expr), input = $input:expr) => {
            #[test]
            fn $func_name() {
                let reducer = SkipLimitReducer::default();
                let actual = $input(reducer).finish();
                assert_eq!(
                    Paging {
                        skip: $skip,
                        limit: $limit
                    },
                    actual
                );
            }
        };
    }

    test_paging!(
        nothing_pending,
        expected = (None, None),
        input = |r: SkipLimitReducer| r
    );
    test_paging!(
        skip_skip,
        expected = (Some(10), None),
        input = |r: SkipLimitReducer| r.skip(5).skip(5)
    );
    test_paging!(
        skip_take,
        expected = (Some(5), Some(5)),
        input = |r: SkipLimitReducer| r.skip(5).take(5)
    );
    test_paging!(
        skip_take_skip_inside_window,
        expected = (Some(15), Some(10)),
        input = |r: SkipLimitReducer| r.skip(5).take(20).skip(10)
    );
    test_paging!(
        skip_take_skip_past_window,
        expected = (Some(0), Some(0)),
        input = |r: SkipLimitReducer| r.skip(5).take(20).skip(30)
    );
    test_paging!(
        take_skip,
        expected = (Some(10), Some(10)),
        input = |r: SkipLimitReducer| r.take(20).skip(10)
    );
    test_paging!(
        take_take_smaller_second,
        expected = (None, Some(5)),
        input = |r: SkipLimitReducer| r.take(20).take(5)
    );
    test_paging!(
        take_take_smaller_first,
        expected = (None, Some(5)),
        input = |r: SkipLimitReducer| r.take(5).take(20)
    );
    test_paging!(
        zero_skip_is_not_emitted,
        expected = (None, Some(3)),
        input = |r: SkipLimitReducer| r.skip(0).take(3)
    );
    test_paging!(
        take_zero_is_empty,
        expected = (Some(0), Some(0)),
        input = |r: SkipLimitReducer| r.skip(4).take(0)
    );

    mod properties {
        use super::SkipLimitReducer;
        use quickcheck::quickcheck;

        quickcheck! {
            fn skips_add(a: u32, b: u32) -> bool {
                let paging = SkipLimitReducer::default()
                    .skip(a.into())
                    .skip(b.into())
                    .finish();
                let total = u64::from(a) + u64::from(b);
                paging.limit.is_none() && paging.skip == (total > 0).then_some(total)
            }

            fn takes_keep_minimum(a: u32, b: u32) -> bool {
                let paging = SkipLimitReducer::default()
                    .take(a.into())
                    .take(b.into())
                    .finish();
                paging.limit == Some(u64::from(a.min(b)))
            }

            fn take_then_skip_never_goes_negative(a: u32, b: u32) -> bool {
                let paging = SkipLimitReducer::default()
                    .take(a.into())
                    .skip(b.into())
                    .finish();
                let expected = u64::from(a).saturating_sub(u64::from(b));
                paging.limit == Some(expected)
            }

            fn window_never_grows(a: u32, b: u32, c: u32) -> bool {
                let reducer = SkipLimitReducer::default().take(a.into());
                let paged = reducer.skip(b.into()).take(c.into()).finish();
                paged.limit.unwrap_or(u64::MAX) <= u64::from(a)
            }
        }
    }
}
