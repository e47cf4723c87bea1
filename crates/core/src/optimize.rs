//! Robertson-style branch/size-resolution optimizer.
//!
//! Starts from the shortest form of every bytecode, records a span for
//! each length that depends on a distance, and iterates to a fixed point:
//!
//! 1a. Number bytecodes and lay them out at minimum length, collecting
//!     spans and offset-setters (align/org).
//! 1b. First expansion sweep: spans whose distance already exceeds its
//!     thresholds (or can never resolve) expand immediately.
//! 1c. Re-offset with the post-sweep lengths.
//! 1d. Recompute span distances; queue whatever still exceeds. Nothing
//!     queued means the layout is already stable.
//! 1e. Build the interval tree of span terms and reject repeat-count
//!     cycles.
//! 2.  Drain the queues, expanding bytecodes and propagating each length
//!     change through the tree and through following offset-setters.
//!     Repeat counts (queue A) drain before everything else (queue B) so
//!     they absorb growth before provoking more expansions.
//! 3.  Final re-offset.

use std::collections::VecDeque;

use crate::bytecode::{BcId, Location};
use crate::contents::{Expansion, SpanRequest, SpecialKind};
use crate::errwarns::{CoreError, Errwarns};
use crate::itree::IntervalTree;
use crate::object::Object;
use crate::value::Value;

/// Bound on main-loop expansions, scaled by bytecode count. A bytecode
/// has finitely many length forms, so hitting this means the optimizer
/// itself is broken.
const EXPANSIONS_PER_BYTECODE: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanState {
    Active,
    OnQueue,
    Inactive,
}

/// A symbol-minus-symbol component of a span's value: the unit tracked in
/// the interval tree. Distance runs `from -> to`.
#[derive(Debug)]
struct Term {
    subst: u32,
    from: Location,
    to: Location,
    new_val: i64,
}

/// One declared dependency: `bc`'s tail may grow when the value described
/// by `depval` leaves `[neg_thres, pos_thres]`.
#[derive(Debug)]
struct Span {
    bc: BcId,
    depval: Value,
    terms: Vec<Term>,
    cur_val: i64,
    new_val: i64,
    neg_thres: i64,
    pos_thres: i64,
    id: i32,
    state: SpanState,
    retired: bool,
    /// Span indices that led to this span; used to detect repeat-count
    /// cycles in step 1e.
    backtrace: Vec<usize>,
    /// Index of the first offset-setter following this span's bytecode.
    os_index: usize,
}

impl Span {
    /// Re-evaluate the watched value from current term distances.
    /// Returns whether the span needs expansion. Values that can never
    /// become a plain integer saturate and deactivate the span, forcing
    /// its longest form.
    fn recalc_normal(&mut self, object: &Object) -> bool {
        self.new_val = 0;

        if let Some(abs) = &self.depval.abs {
            let mut expr = abs.clone();
            let slots = self
                .terms
                .iter()
                .map(|term| term.subst as usize + 1)
                .max()
                .unwrap_or(0);
            let mut values = vec![0i64; slots];
            for term in &self.terms {
                values[term.subst as usize] = term.new_val;
            }
            expr.subst(&values);
            expr.simplify(object, false);
            self.new_val = match expr.get_intnum() {
                Some(value) => value.to_i64_saturating(),
                None => i64::MAX,
            };
        }

        if self.depval.is_relative() {
            self.new_val = i64::MAX;
        }

        if self.new_val == i64::MAX {
            self.state = SpanState::Inactive;
        }

        // id <= 0 expands on any change, not on a threshold crossing.
        if self.id <= 0 {
            return self.new_val != self.cur_val;
        }
        self.new_val < self.neg_thres || self.new_val > self.pos_thres
    }

    /// Materialize sym-minus-sym terms out of the value's absolute
    /// portion. For recompute-on-change spans, a term whose interval
    /// covers the span's own bytecode is a cycle.
    fn create_terms(&mut self, object: &Object) -> Result<(), CoreError> {
        let Some(abs) = &mut self.depval.abs else {
            return Ok(());
        };

        let mut pairs = Vec::new();
        abs.subst_dist(object, &mut |subst, from, to| pairs.push((subst, from, to)));

        let own_index = i64::from(object.bytecode(self.bc).index());
        for (subst, from, to) in pairs {
            let dist = object.calc_dist(from, to).ok_or_else(|| {
                CoreError::Internal("span term distance crosses sections".into())
            })?;
            if self.id <= 0
                && let Some((low, high)) = interval_of(object, from, to)
                && (low..=high).contains(&own_index)
            {
                return Err(CoreError::Value("circular reference detected".into()));
            }
            self.terms.push(Term {
                subst,
                from,
                to,
                new_val: dist,
            });
        }
        Ok(())
    }
}

/// The bytecode-index interval a term's distance depends on. Locations
/// are anchored at bytecode starts, so the distance moves with the total
/// length of every bytecode from the lower anchor up to (excluding) the
/// upper one. `None` when both anchors sit on one bytecode (constant
/// distance).
fn interval_of(object: &Object, from: Location, to: Location) -> Option<(i64, i64)> {
    let i1 = i64::from(object.bytecode(from.bc).index());
    let i2 = i64::from(object.bytecode(to.bc).index());
    if i1 == i2 {
        return None;
    }
    Some((i1.min(i2), i1.max(i2) - 1))
}

#[derive(Debug, Clone, Copy)]
struct TermRef {
    span: usize,
    term: usize,
}

/// An align/org bytecode: adjusts following offsets rather than having a
/// length of its own to resolve.
#[derive(Debug, Default, Clone, Copy)]
struct OffsetSetter {
    bc: Option<BcId>,
    cur_val: u64,
    new_val: u64,
}

struct Optimizer {
    spans: Vec<Span>,
    qa: VecDeque<usize>,
    qb: VecDeque<usize>,
    itree: IntervalTree<TermRef>,
    offset_setters: Vec<OffsetSetter>,
}

impl Optimizer {
    fn new() -> Self {
        Self {
            spans: Vec::new(),
            qa: VecDeque::new(),
            qb: VecDeque::new(),
            itree: IntervalTree::new(),
            // Leading placeholder: spans whose bytecode precedes every
            // offset-setter point here, and the step-2 walk stops on its
            // empty `bc`.
            offset_setters: vec![OffsetSetter::default()],
        }
    }

    fn add_span(&mut self, bc: BcId, request: SpanRequest) {
        self.spans.push(Span {
            bc,
            depval: request.value,
            terms: Vec::new(),
            cur_val: 0,
            new_val: 0,
            neg_thres: request.neg_thres,
            pos_thres: request.pos_thres,
            id: request.id,
            state: SpanState::Active,
            retired: false,
            backtrace: Vec::new(),
            os_index: self.offset_setters.len() - 1,
        });
    }

    fn add_offset_setter(&mut self, bc: BcId) {
        let last = self
            .offset_setters
            .last_mut()
            .expect("offset setter list always has a tail placeholder");
        last.bc = Some(bc);
        self.offset_setters.push(OffsetSetter::default());
    }

    /// Initial expansion sweep over the freshly-created spans.
    fn step_1b(&mut self, object: &mut Object, errwarns: &mut Errwarns) -> bool {
        let mut saw_error = false;

        for index in 0..self.spans.len() {
            let line = object.bytecode(self.spans[index].bc).line();

            let terms_ok = match self.spans[index].create_terms(object) {
                Ok(()) => true,
                Err(err) => {
                    errwarns.propagate(line, err);
                    saw_error = true;
                    false
                }
            };

            if terms_ok && self.spans[index].recalc_normal(object) {
                let (bc, id, cur, new) = {
                    let span = &self.spans[index];
                    (span.bc, span.id, span.cur_val, span.new_val)
                };
                match object.expand_bc(bc, id, cur, new) {
                    Err(err) => {
                        errwarns.propagate(line, err);
                        saw_error = true;
                    }
                    Ok(Expansion::Dependent {
                        neg_thres,
                        pos_thres,
                    }) => {
                        let span = &mut self.spans[index];
                        if span.state == SpanState::Inactive {
                            errwarns.propagate(
                                line,
                                CoreError::Value(
                                    "secondary expansion of an external/complex value".into(),
                                ),
                            );
                            saw_error = true;
                        } else {
                            span.neg_thres = neg_thres;
                            span.pos_thres = pos_thres;
                        }
                    }
                    Ok(Expansion::Done) => {
                        self.spans[index].retired = true;
                    }
                }
            }

            let new_val = self.spans[index].new_val;
            self.spans[index].cur_val = new_val;
        }

        self.spans.retain(|span| !span.retired);
        saw_error
    }

    /// Re-derive every span's distance from the step-1c offsets and seed
    /// the queue. Returns true when nothing needs step 2.
    fn step_1d(&mut self, object: &Object, errwarns: &mut Errwarns) -> bool {
        for index in 0..self.spans.len() {
            let span = &mut self.spans[index];
            let mut term_error = false;
            for term in &mut span.terms {
                match object.calc_dist(term.from, term.to) {
                    Some(dist) => term.new_val = dist,
                    None => term_error = true,
                }
            }
            if term_error {
                let line = object.bytecode(span.bc).line();
                errwarns.propagate(
                    line,
                    CoreError::Internal("span term lost its anchors during re-offset".into()),
                );
                continue;
            }
            if span.recalc_normal(object) {
                span.state = SpanState::OnQueue;
                self.qb.push_back(index);
            }
        }
        self.qa.is_empty() && self.qb.is_empty()
    }

    /// Snapshot offset-setters, build the interval tree, and reject
    /// repeat-count cycles.
    fn step_1e(&mut self, object: &Object, errwarns: &mut Errwarns) -> bool {
        for os in &mut self.offset_setters {
            if let Some(bc) = os.bc {
                let offset = object.bytecode(bc).offset();
                os.cur_val = offset;
                os.new_val = offset;
            }
        }

        for (span_index, span) in self.spans.iter().enumerate() {
            for (term_index, term) in span.terms.iter().enumerate() {
                if let Some((low, high)) = interval_of(object, term.from, term.to) {
                    self.itree.insert(
                        low,
                        high,
                        TermRef {
                            span: span_index,
                            term: term_index,
                        },
                    );
                }
            }
        }

        let mut saw_error = false;
        for index in 0..self.spans.len() {
            if self.spans[index].id > 0 {
                continue;
            }
            let point = i64::from(object.bytecode(self.spans[index].bc).index());
            let mut hits = Vec::new();
            self.itree
                .enumerate_overlapping(point, &mut |hit| hits.push(*hit));

            for hit in hits {
                let dep = hit.span;
                if self.spans[dep].id > 0 {
                    continue;
                }
                if dep == index || self.spans[index].backtrace.contains(&dep) {
                    let line = object.bytecode(self.spans[index].bc).line();
                    errwarns
                        .propagate(line, CoreError::Value("circular reference detected".into()));
                    saw_error = true;
                    break;
                }
                let mut trail = self.spans[index].backtrace.clone();
                trail.push(index);
                self.spans[dep].backtrace.extend(trail);
            }
        }
        saw_error
    }

    fn pop_queue(&mut self) -> Option<usize> {
        self.qa.pop_front().or_else(|| self.qb.pop_front())
    }

    /// Main loop: drain the queues, expanding and propagating until the
    /// layout stops moving.
    fn step_2(&mut self, object: &mut Object, errwarns: &mut Errwarns, limit: u64) -> bool {
        let mut saw_error = false;
        let mut expansions = 0u64;

        while let Some(index) = self.pop_queue() {
            if self.spans[index].state == SpanState::Inactive {
                continue;
            }
            self.spans[index].state = SpanState::Active;

            // Offset-setters may have shrunk the distance again since
            // this span was queued.
            if !self.spans[index].recalc_normal(object) {
                continue;
            }

            expansions += 1;
            if expansions > limit {
                errwarns.propagate(
                    0,
                    CoreError::Internal("optimizer failed to converge".into()),
                );
                return true;
            }

            let (bc, id, cur, new) = {
                let span = &self.spans[index];
                (span.bc, span.id, span.cur_val, span.new_val)
            };
            let line = object.bytecode(bc).line();
            let orig_total = object.bytecode(bc).total_len();

            match object.expand_bc(bc, id, cur, new) {
                Err(err) => {
                    let fatal = err.is_fatal();
                    errwarns.propagate(line, err);
                    saw_error = true;
                    if fatal {
                        return true;
                    }
                    continue;
                }
                Ok(Expansion::Dependent {
                    neg_thres,
                    pos_thres,
                }) => {
                    let span = &mut self.spans[index];
                    span.neg_thres = neg_thres;
                    span.pos_thres = pos_thres;
                    span.cur_val = span.new_val;
                }
                Ok(Expansion::Done) => {
                    self.spans[index].state = SpanState::Inactive;
                }
            }

            let len_diff = object.bytecode(bc).total_len() as i64 - orig_total as i64;
            if len_diff == 0 {
                continue;
            }

            let point = i64::from(object.bytecode(bc).index());
            self.propagate_len_change(object, point, len_diff);

            // Walk offset-setters following the expanded bytecode. Each
            // either absorbs the movement (align with unchanged pad, org
            // with slack) or passes the remainder along.
            let mut os_index = self.spans[index].os_index;
            let mut offset_diff = len_diff;
            while os_index < self.offset_setters.len() && offset_diff != 0 {
                let Some(os_bc) = self.offset_setters[os_index].bc else {
                    break;
                };
                if os_bc.section != bc.section {
                    break;
                }

                let old_next =
                    self.offset_setters[os_index].cur_val + object.bytecode(os_bc).total_len();
                let moved = self.offset_setters[os_index].new_val as i64 + offset_diff;
                if moved < 0 {
                    errwarns.propagate(
                        line,
                        CoreError::Internal("offset setter moved to a negative offset".into()),
                    );
                    return true;
                }
                self.offset_setters[os_index].new_val = moved as u64;

                let orig_tail = object.bytecode(os_bc).tail_len();
                let os_line = object.bytecode(os_bc).line();
                if let Err(err) = object.expand_bc(
                    os_bc,
                    1,
                    self.offset_setters[os_index].cur_val as i64,
                    moved,
                ) {
                    errwarns.propagate(os_line, err);
                    saw_error = true;
                    break;
                }

                offset_diff = self.offset_setters[os_index].new_val as i64
                    + object.bytecode(os_bc).total_len() as i64
                    - old_next as i64;
                let tail_diff = object.bytecode(os_bc).tail_len() as i64 - orig_tail as i64;
                if tail_diff != 0 {
                    let os_point = i64::from(object.bytecode(os_bc).index());
                    self.propagate_len_change(object, os_point, tail_diff);
                }

                self.offset_setters[os_index].cur_val = self.offset_setters[os_index].new_val;
                os_index += 1;
            }
        }
        saw_error
    }

    /// Apply a length change at `point` to every term spanning it, and
    /// queue owners that now exceed their thresholds.
    fn propagate_len_change(&mut self, object: &Object, point: i64, len_diff: i64) {
        let mut hits = Vec::new();
        self.itree
            .enumerate_overlapping(point, &mut |hit| hits.push(*hit));

        for hit in hits {
            if self.spans[hit.span].state == SpanState::Inactive {
                continue;
            }

            let forward = {
                let term = &self.spans[hit.span].terms[hit.term];
                object.bytecode(term.from.bc).index() < object.bytecode(term.to.bc).index()
            };
            {
                let term = &mut self.spans[hit.span].terms[hit.term];
                if forward {
                    term.new_val += len_diff;
                } else {
                    term.new_val -= len_diff;
                }
            }

            if self.spans[hit.span].state == SpanState::OnQueue {
                continue;
            }
            if !self.spans[hit.span].recalc_normal(object) {
                continue;
            }
            if self.spans[hit.span].id <= 0 {
                self.qa.push_back(hit.span);
            } else {
                self.qb.push_back(hit.span);
            }
            self.spans[hit.span].state = SpanState::OnQueue;
        }
    }
}

/// Resolve all bytecode lengths and offsets. On return either every
/// offset is final or `errwarns` holds at least one error and the
/// remaining steps were skipped.
pub(crate) fn optimize(object: &mut Object, errwarns: &mut Errwarns) {
    let mut opt = Optimizer::new();
    let mut bc_index = 0u32;
    let mut total_bcs = 0u64;
    let mut saw_error = false;

    // Step 1a: number and lay out at minimum length, collecting spans
    // and offset-setters.
    for section in 0..object.sections().len() as u32 {
        let count = object.section(section).bytecodes().len() as u32;
        let mut offset = 0u64;
        for pos in 0..count {
            let id = BcId { section, pos };
            total_bcs += 1;
            {
                let bc = object.bytecode_mut(id);
                bc.set_index(bc_index);
                bc_index += 1;
                bc.set_offset(offset);
                bc.freeze_fixed_len();
            }

            let mut requests = Vec::new();
            match object.calc_bc_len(id, &mut |request| requests.push(request)) {
                Err(err) => {
                    let line = object.bytecode(id).line();
                    let fatal = err.is_fatal();
                    errwarns.propagate(line, err);
                    saw_error = true;
                    if fatal {
                        return;
                    }
                }
                Ok(()) => {
                    for request in requests {
                        opt.add_span(id, request);
                    }
                    let is_offset_setter = object
                        .bytecode(id)
                        .contents()
                        .is_some_and(|c| c.special_kind() == SpecialKind::OffsetSetter);
                    if is_offset_setter {
                        opt.add_offset_setter(id);
                    }
                    offset = object.bytecode(id).next_offset();
                }
            }
        }
    }
    if saw_error {
        return;
    }

    // Step 1b.
    if opt.step_1b(object, errwarns) || errwarns.num_errors() > 0 {
        return;
    }

    // Step 1c.
    object.update_offsets(errwarns);
    if errwarns.num_errors() > 0 {
        return;
    }

    // Step 1d; an empty queue means the layout is already final.
    let done = opt.step_1d(object, errwarns);
    if errwarns.num_errors() > 0 {
        return;
    }
    if done {
        object.update_offsets(errwarns);
        return;
    }

    // Step 1e.
    if opt.step_1e(object, errwarns) || errwarns.num_errors() > 0 {
        return;
    }

    // Step 2.
    let limit = total_bcs.saturating_mul(EXPANSIONS_PER_BYTECODE).max(1024);
    if opt.step_2(object, errwarns, limit) || errwarns.num_errors() > 0 {
        return;
    }

    // Step 3.
    object.update_offsets(errwarns);
}
