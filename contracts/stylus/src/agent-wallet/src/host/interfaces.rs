//! Solidity ABI of the contracts the wallet calls out to.

use stylus_sdk::alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Registry mapping lego ids to integration contracts.
    interface ILegoBook {
        function getLegoAddr(uint256 legoId) external view returns (address);
    }

    interface IPriceOracle {
        function getUsdValue(address asset, uint256 amount) external view returns (uint256);
    }

    /// A protocol integration. `params` is the wallet's compact encoding of the resolved
    /// parameters; the lego pulls what it needs from the calling wallet.
    interface ILego {
        function performAction(uint8 kind, bytes params)
            external
            returns (uint256 amountIn, uint256 amountOut, uint256 secondaryOut, uint256 usdValue);
    }
}
