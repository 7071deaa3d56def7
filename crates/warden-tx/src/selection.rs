use async_trait::async_trait;
use std::collections::VecDeque;
use warden_core::boxes::{Assets, TokenBag, UtxoBox};
use warden_core::error::WardenError;
use warden_core::types::{BoxId, Value};

/// A pull-based supply of candidate funding boxes.
///
/// Production code pages through the chain client; tests hand over a fixed
/// list. `Ok(None)` means the source is exhausted.
#[async_trait]
pub trait BoxSource: Send {
    async fn next_box(&mut self) -> Result<Option<UtxoBox>, WardenError>;
}

/// In-memory box source yielding boxes in the order given.
#[derive(Debug, Default)]
pub struct VecBoxSource {
    boxes: VecDeque<UtxoBox>,
}

impl VecBoxSource {
    pub fn new(boxes: Vec<UtxoBox>) -> Self {
        Self { boxes: boxes.into() }
    }
}

#[async_trait]
impl BoxSource for VecBoxSource {
    async fn next_box(&mut self) -> Result<Option<UtxoBox>, WardenError> {
        Ok(self.boxes.pop_front())
    }
}

/// Wraps another source and skips boxes that are already spoken for, such
/// as permits or commitments spent by the same transaction.
pub struct Excluding<'a> {
    inner: &'a mut dyn BoxSource,
    exclude: Vec<BoxId>,
}

impl<'a> Excluding<'a> {
    pub fn new(inner: &'a mut dyn BoxSource, exclude: Vec<BoxId>) -> Self {
        Self { inner, exclude }
    }
}

#[async_trait]
impl BoxSource for Excluding<'_> {
    async fn next_box(&mut self) -> Result<Option<UtxoBox>, WardenError> {
        while let Some(b) = self.inner.next_box().await? {
            if !self.exclude.contains(&b.box_id) {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }
}

// ── Greedy cover ─────────────────────────────────────────────────────────────

/// Running state of a selection: takes a box only if it helps with a value
/// or token requirement that is still unmet.
struct Cover<'a> {
    value: Value,
    tokens: &'a TokenBag,
    found_value: Value,
    found_tokens: TokenBag,
    selected: Vec<UtxoBox>,
}

impl<'a> Cover<'a> {
    fn new(value: Value, tokens: &'a TokenBag) -> Self {
        Self { value, tokens, found_value: 0, found_tokens: TokenBag::new(), selected: Vec::new() }
    }

    fn is_covered(&self) -> bool {
        self.found_value >= self.value
            && self.tokens.iter().all(|t| self.found_tokens.amount_of(&t.id) >= t.amount)
    }

    fn helps(&self, b: &UtxoBox) -> bool {
        if self.found_value < self.value && b.value() > 0 {
            return true;
        }
        self.tokens.iter().any(|t| {
            self.found_tokens.amount_of(&t.id) < t.amount && b.tokens().amount_of(&t.id) > 0
        })
    }

    fn offer(&mut self, b: UtxoBox) -> Result<(), WardenError> {
        if !self.helps(&b) {
            return Ok(());
        }
        self.found_value = self.found_value.checked_add(b.value()).ok_or(WardenError::ValueOverflow)?;
        for t in b.tokens().iter() {
            self.found_tokens.add(t.id, t.amount)?;
        }
        self.selected.push(b);
        Ok(())
    }

    fn finish(self) -> Result<Vec<UtxoBox>, WardenError> {
        if self.found_value < self.value {
            return Err(WardenError::InsufficientFunds { need: self.value, found: self.found_value });
        }
        for t in self.tokens.iter() {
            let found = self.found_tokens.amount_of(&t.id);
            if found < t.amount {
                return Err(WardenError::InsufficientTokens { token: t.id, need: t.amount, found });
            }
        }
        Ok(self.selected)
    }
}

/// Pick boxes from `available`, in order, until their total value reaches
/// `value` and they hold at least `tokens`.
pub fn select_inputs(
    available: &[UtxoBox],
    value: Value,
    tokens: &TokenBag,
) -> Result<Vec<UtxoBox>, WardenError> {
    let mut cover = Cover::new(value, tokens);
    for b in available {
        if cover.is_covered() {
            break;
        }
        cover.offer(b.clone())?;
    }
    cover.finish()
}

/// Same as [`select_inputs`] but pulls boxes lazily from `source`, stopping
/// as soon as the requirement is met.
pub async fn select_from_source(
    source: &mut dyn BoxSource,
    value: Value,
    tokens: &TokenBag,
) -> Result<Vec<UtxoBox>, WardenError> {
    let mut cover = Cover::new(value, tokens);
    while !cover.is_covered() {
        match source.next_box().await? {
            Some(b) => cover.offer(b)?,
            None => break,
        }
    }
    cover.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::boxes::BoxCandidate;
    use warden_core::types::{Address, TokenId, TxId};

    fn utxo(seed: u8, value: Value, tokens: TokenBag) -> UtxoBox {
        let mut c = BoxCandidate::new(value, Address::new("watcher"), 1);
        c.tokens = tokens;
        c.into_box(&TxId([seed; 32]), 0)
    }

    fn rwt() -> TokenId {
        TokenId([0xAA; 32])
    }

    #[test]
    fn takes_boxes_in_order_until_covered() {
        let boxes = vec![
            utxo(1, 300, TokenBag::new()),
            utxo(2, 300, TokenBag::new()),
            utxo(3, 300, TokenBag::new()),
        ];
        let picked = select_inputs(&boxes, 500, &TokenBag::new()).unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].box_id, boxes[0].box_id);
    }

    #[test]
    fn skips_boxes_that_do_not_help() {
        let boxes = vec![
            utxo(1, 1_000, TokenBag::new()),
            utxo(2, 10, TokenBag::new()),
            utxo(3, 10, TokenBag::new().with(rwt(), 5)),
        ];
        let need = TokenBag::new().with(rwt(), 5);
        let picked = select_inputs(&boxes, 500, &need).unwrap();
        let ids: Vec<_> = picked.iter().map(|b| b.box_id).collect();
        assert_eq!(ids, vec![boxes[0].box_id, boxes[2].box_id]);
    }

    #[test]
    fn zero_requirement_selects_nothing() {
        let boxes = vec![utxo(1, 100, TokenBag::new())];
        assert!(select_inputs(&boxes, 0, &TokenBag::new()).unwrap().is_empty());
    }

    #[test]
    fn reports_shortfall() {
        let boxes = vec![utxo(1, 100, TokenBag::new().with(rwt(), 2))];
        assert!(matches!(
            select_inputs(&boxes, 500, &TokenBag::new()),
            Err(WardenError::InsufficientFunds { need: 500, found: 100 })
        ));
        let need = TokenBag::new().with(rwt(), 3);
        assert!(matches!(
            select_inputs(&boxes, 50, &need),
            Err(WardenError::InsufficientTokens { need: 3, found: 2, .. })
        ));
    }

    #[tokio::test]
    async fn source_is_pulled_lazily() {
        let boxes = vec![
            utxo(1, 400, TokenBag::new()),
            utxo(2, 400, TokenBag::new()),
            utxo(3, 400, TokenBag::new()),
        ];
        let mut source = VecBoxSource::new(boxes.clone());
        let picked = select_from_source(&mut source, 700, &TokenBag::new()).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(source.next_box().await.unwrap().unwrap().box_id, boxes[2].box_id);
    }

    #[tokio::test]
    async fn excluded_boxes_are_skipped() {
        let boxes = vec![utxo(1, 400, TokenBag::new()), utxo(2, 500, TokenBag::new())];
        let mut inner = VecBoxSource::new(boxes.clone());
        let mut source = Excluding::new(&mut inner, vec![boxes[0].box_id]);
        let picked = select_from_source(&mut source, 300, &TokenBag::new()).await.unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].box_id, boxes[1].box_id);
    }
}
