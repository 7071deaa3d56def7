use warden_core::boxes::{Assets, BoxCandidate, TokenBag};
use warden_core::error::WardenError;
use warden_core::types::{Address, Height, TokenId, Value};

/// Collect the token ids of `boxes` in first-seen order.
fn token_ids<A: Assets>(boxes: &[A], ids: &mut Vec<TokenId>) {
    for b in boxes {
        for t in b.tokens().iter() {
            if !ids.contains(&t.id) {
                ids.push(t.id);
            }
        }
    }
}

fn total_of<A: Assets>(boxes: &[A], id: &TokenId) -> u128 {
    boxes.iter().map(|b| b.tokens().amount_of(id) as u128).sum()
}

/// Compute the single change box that returns everything `inputs` hold
/// beyond `outputs` and `fee` to `owner`.
///
/// Returns `Ok(None)` when inputs are fully consumed. Never clamps: an
/// output claiming more of a token than the inputs hold is
/// `TokenOverspend`, and left-over tokens with no value to carry them are
/// `TokenBurn`.
pub fn compute_change_box<I: Assets, O: Assets>(
    inputs: &[I],
    outputs: &[O],
    fee: Value,
    height: Height,
    owner: &Address,
) -> Result<Option<BoxCandidate>, WardenError> {
    let mut ids = Vec::new();
    token_ids(inputs, &mut ids);
    token_ids(outputs, &mut ids);

    let mut residual = TokenBag::new();
    for id in &ids {
        let held = total_of(inputs, id);
        let spent = total_of(outputs, id);
        if spent > held {
            return Err(WardenError::TokenOverspend {
                token: *id,
                spent: u64::try_from(spent).unwrap_or(u64::MAX),
                held: u64::try_from(held).unwrap_or(u64::MAX),
            });
        }
        let left = u64::try_from(held - spent).map_err(|_| WardenError::TokenOverflow(*id))?;
        residual.add(*id, left)?;
    }

    let in_value: u128 = inputs.iter().map(|b| b.value() as u128).sum();
    let need: u128 = outputs.iter().map(|b| b.value() as u128).sum::<u128>() + fee as u128;
    if need > in_value {
        return Err(WardenError::ValueOverspend {
            need: u64::try_from(need).unwrap_or(u64::MAX),
            have: u64::try_from(in_value).unwrap_or(u64::MAX),
        });
    }
    let value = u64::try_from(in_value - need).map_err(|_| WardenError::ValueOverflow)?;

    if value == 0 {
        return match residual.first() {
            None => Ok(None),
            Some(t) => Err(WardenError::TokenBurn { token: t.id, amount: t.amount }),
        };
    }

    let mut change = BoxCandidate::new(value, owner.clone(), height);
    change.tokens = residual;
    Ok(Some(change))
}
