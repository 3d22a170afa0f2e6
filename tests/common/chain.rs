use std::sync::{Arc, Mutex};

use ibft_rs::{
    chain::{
        Chain, ChainError, ProduceBlockRequest, ProduceBlockResponse, ValidateBlockRequest,
        ValidateBlockResponse,
    },
    types::{
        block::{BlockHeader, SealedBlock},
        data_types::{Data, Datum},
    },
};

/// An in-memory chain. Clones share the same blocks, so tests can inspect the chain of a running replica.
#[derive(Clone)]
pub(crate) struct MemChain {
    blocks: Arc<Mutex<Vec<SealedBlock>>>,
}

impl MemChain {
    pub(crate) fn new() -> MemChain {
        MemChain {
            blocks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn height(&self) -> u64 {
        self.blocks.lock().unwrap().len() as u64
    }

    pub(crate) fn blocks(&self) -> Vec<SealedBlock> {
        self.blocks.lock().unwrap().clone()
    }
}

impl Chain for MemChain {
    fn chain_head_header(&self) -> BlockHeader {
        match self.blocks.lock().unwrap().last() {
            Some(sealed_block) => sealed_block.block.header.clone(),
            None => BlockHeader::genesis(),
        }
    }

    fn produce_block(&mut self, request: ProduceBlockRequest) -> ProduceBlockResponse {
        // The data records the round the block was produced in.
        let round = request.round();
        let datum = [round.height.to_le_bytes(), (round.round.int() as u64).to_le_bytes()].concat();
        ProduceBlockResponse {
            data: Data::new(vec![Datum::new(datum)]),
        }
    }

    fn validate_block(&mut self, request: ValidateBlockRequest) -> ValidateBlockResponse {
        if request.block().data.len() == 1 {
            ValidateBlockResponse::Valid
        } else {
            ValidateBlockResponse::Invalid
        }
    }

    fn append_block(&mut self, sealed_block: SealedBlock) -> Result<(), ChainError> {
        let mut blocks = self.blocks.lock().unwrap();
        let head = match blocks.last() {
            Some(head) => head.block.header.clone(),
            None => BlockHeader::genesis(),
        };
        if sealed_block.block.header.parent_hash != head.hash() {
            return Err(ChainError::NotNextBlock { head });
        }
        blocks.push(sealed_block);
        Ok(())
    }
}
