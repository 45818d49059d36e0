//! Queue of clients waiting for a host.
//!
//! Clients are stored in insertion order. That order carries no meaning except as the tie-break
//! for [`ClientQueue::select_max`]: removing a client keeps the relative order of the rest, so
//! "first in the collection" and "earliest inserted still present" coincide.

use crate::client::{validate_files, Client, ClientId};
use crate::error::{Result, StateFault};
use crate::priority::coefficient;
use crate::snapshot::ClientSnapshot;

/// Ordered collection of waiting clients. Owned and mutated by the scheduler only.
#[derive(Debug)]
pub struct ClientQueue {
    clients: Vec<Client>,
    next_id: u64,
}

impl ClientQueue {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            next_id: 1,
        }
    }

    /// Admit a new client at the back of the queue.
    ///
    /// The initial coefficient uses `wait_ticks = 0` and the queue size after the insertion.
    /// Other clients keep their coefficients until the next [`ClientQueue::tick`].
    ///
    /// # Arguments
    /// * `files` - File sizes, non-empty, each in 1..=1000, sorted ascending
    ///
    /// # Returns
    /// The id assigned to the client, or `InvalidClientSpec` (nothing is queued in that case).
    pub fn insert(&mut self, files: Vec<u32>) -> Result<ClientId> {
        validate_files(&files)?;

        let id = ClientId(self.next_id);
        let mut client = Client::new(id, files);
        let smallest = client.files[0];
        client.coefficient = coefficient(0, smallest, self.clients.len() + 1)?;

        self.next_id += 1;
        self.clients.push(client);
        Ok(id)
    }

    /// Age every client by one tick and recompute all coefficients.
    ///
    /// The queue size is read once, so every coefficient of the pass shares the same divisor.
    pub fn tick(&mut self) -> Result<()> {
        let queue_size = self.clients.len();
        for client in &mut self.clients {
            client.wait_ticks += 1;
            let smallest = client
                .smallest_file()
                .ok_or(StateFault::EmptyClient(client.id))?;
            client.coefficient = coefficient(client.wait_ticks, smallest, queue_size)?;
        }
        Ok(())
    }

    /// Client with the strictly greatest coefficient; ties go to the earliest inserted.
    pub fn select_max(&self) -> Option<&Client> {
        let mut best: Option<&Client> = None;
        for client in &self.clients {
            match best {
                Some(current) if client.coefficient <= current.coefficient => {}
                _ => best = Some(client),
            }
        }
        best
    }

    /// Remove and return the smallest remaining file of a client.
    ///
    /// The client stays queued even when this empties it; callers follow up with
    /// [`ClientQueue::remove_if_empty`] in the same step.
    pub fn consume_smallest_file(&mut self, id: ClientId) -> Result<u32> {
        let client = self.get_mut(id)?;
        let file = client
            .files
            .pop_front()
            .ok_or(StateFault::EmptyClient(id))?;
        Ok(file)
    }

    /// Drop a client whose files are exhausted.
    ///
    /// # Returns
    /// `true` when the client was removed, `false` when it still holds files.
    pub fn remove_if_empty(&mut self, id: ClientId) -> Result<bool> {
        let index = self.position(id)?;
        if self.clients[index].files.is_empty() {
            self.clients.remove(index);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|client| client.id == id)
    }

    /// Clients in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<ClientSnapshot> {
        self.clients
            .iter()
            .map(|client| ClientSnapshot {
                id: client.id,
                files: client.files().collect(),
                wait_ticks: client.wait_ticks,
                coefficient: client.coefficient,
            })
            .collect()
    }

    fn position(&self, id: ClientId) -> Result<usize> {
        self.clients
            .iter()
            .position(|client| client.id == id)
            .ok_or_else(|| StateFault::ClientNotFound(id).into())
    }

    fn get_mut(&mut self, id: ClientId) -> Result<&mut Client> {
        let index = self.position(id)?;
        Ok(&mut self.clients[index])
    }
}

impl Default for ClientQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuctionError;

    #[test]
    fn test_queue_creation() {
        let queue = ClientQueue::new();
        assert!(queue.is_empty());
        assert!(queue.select_max().is_none());
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let mut queue = ClientQueue::new();
        let a = queue.insert(vec![5]).unwrap();
        let b = queue.insert(vec![1, 2]).unwrap();
        assert_eq!(a, ClientId(1));
        assert_eq!(b, ClientId(2));

        // Removing a client never frees its id for reuse.
        queue.consume_smallest_file(a).unwrap();
        assert!(queue.remove_if_empty(a).unwrap());
        let c = queue.insert(vec![9]).unwrap();
        assert_eq!(c, ClientId(3));
    }

    #[test]
    fn insert_rejects_invalid_file_lists() {
        let mut queue = ClientQueue::new();
        assert!(matches!(
            queue.insert(vec![]),
            Err(AuctionError::InvalidClientSpec(_))
        ));
        assert!(matches!(
            queue.insert(vec![10, 2]),
            Err(AuctionError::InvalidClientSpec(_))
        ));
        assert!(queue.is_empty());

        // A rejected insert does not burn an id.
        assert_eq!(queue.insert(vec![2, 10]).unwrap(), ClientId(1));
    }

    #[test]
    fn insert_uses_post_insert_queue_size() {
        let mut queue = ClientQueue::new();
        let first = queue.insert(vec![5]).unwrap();
        assert!((queue.get(first).unwrap().coefficient - (-(5f64).log2())).abs() < 1e-9);

        let second = queue.insert(vec![8]).unwrap();
        let expected = -(8.0f64 / 2.0).log2();
        assert!((queue.get(second).unwrap().coefficient - expected).abs() < 1e-9);
        assert_eq!(queue.get(second).unwrap().wait_ticks, 0);
    }

    #[test]
    fn tick_ages_and_recomputes_with_shared_size() {
        let mut queue = ClientQueue::new();
        let a = queue.insert(vec![4, 6]).unwrap();
        let b = queue.insert(vec![16]).unwrap();
        queue.tick().unwrap();
        queue.tick().unwrap();

        let client_a = queue.get(a).unwrap();
        let client_b = queue.get(b).unwrap();
        assert_eq!(client_a.wait_ticks, 2);
        assert_eq!(client_b.wait_ticks, 2);
        assert!((client_a.coefficient - (2.0 / 2.0 - (4.0f64 / 2.0).log2())).abs() < 1e-9);
        assert!((client_b.coefficient - (2.0 / 2.0 - (16.0f64 / 2.0).log2())).abs() < 1e-9);
    }

    #[test]
    fn select_max_prefers_highest_coefficient() {
        let mut queue = ClientQueue::new();
        queue.insert(vec![900]).unwrap();
        let small = queue.insert(vec![3]).unwrap();
        queue.insert(vec![450]).unwrap();
        queue.tick().unwrap();
        assert_eq!(queue.select_max().unwrap().id, small);
    }

    #[test]
    fn ties_go_to_earliest_insertion() {
        let mut queue = ClientQueue::new();
        let first = queue.insert(vec![50, 60]).unwrap();
        let second = queue.insert(vec![50, 70]).unwrap();
        for _ in 0..5 {
            queue.tick().unwrap();
            assert_eq!(queue.select_max().unwrap().id, first);
        }
        // Once the earlier client leaves, the later one wins.
        queue.consume_smallest_file(first).unwrap();
        queue.consume_smallest_file(first).unwrap();
        assert!(queue.remove_if_empty(first).unwrap());
        assert_eq!(queue.select_max().unwrap().id, second);
    }

    #[test]
    fn consume_keeps_files_sorted() {
        let mut queue = ClientQueue::new();
        let id = queue.insert(vec![1, 3, 3, 8, 20]).unwrap();
        let mut consumed = Vec::new();
        while !queue.remove_if_empty(id).unwrap() {
            consumed.push(queue.consume_smallest_file(id).unwrap());
            if let Some(client) = queue.get(id) {
                let files: Vec<u32> = client.files().collect();
                assert!(files.windows(2).all(|pair| pair[0] <= pair[1]));
            }
        }
        assert_eq!(consumed, vec![1, 3, 3, 8, 20]);
        assert!(queue.get(id).is_none());
    }

    #[test]
    fn missing_clients_are_state_faults() {
        let mut queue = ClientQueue::new();
        assert!(matches!(
            queue.consume_smallest_file(ClientId(99)),
            Err(AuctionError::StateFault(StateFault::ClientNotFound(ClientId(99))))
        ));
        assert!(matches!(
            queue.remove_if_empty(ClientId(99)),
            Err(AuctionError::StateFault(StateFault::ClientNotFound(_)))
        ));
    }

    #[test]
    fn remove_if_empty_keeps_clients_with_files() {
        let mut queue = ClientQueue::new();
        let id = queue.insert(vec![2, 4]).unwrap();
        assert_eq!(queue.consume_smallest_file(id).unwrap(), 2);
        assert!(!queue.remove_if_empty(id).unwrap());
        assert_eq!(queue.len(), 1);
    }
}
